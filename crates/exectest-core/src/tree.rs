//! The discovered test hierarchy.
//!
//! ```text
//! Unit                       label group (groupByLabel roots only)
//! └── build/tests            root group
//!     └── math               directory group
//!         └── test_add       leaf
//! ```
//!
//! Ids are hashes of stable inputs: leaves hash their absolute executable
//! path, groups hash their position in the label/root/directory hierarchy.
//! Rebuilding from the same inputs yields the same ids.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::resolve::ResolvedRoot;

const ID_LEN: usize = 16;

/// A node in the test tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TestNode {
    Group(TestGroup),
    Leaf(TestLeaf),
}

impl TestNode {
    pub fn id(&self) -> &str {
        match self {
            TestNode::Group(group) => &group.id,
            TestNode::Leaf(leaf) => &leaf.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TestNode::Group(group) => &group.label,
            TestNode::Leaf(leaf) => &leaf.label,
        }
    }
}

/// A non-runnable node that aggregates other nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestGroup {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub children: Vec<TestNode>,
}

/// A discovered test executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestLeaf {
    pub id: String,
    pub label: String,
    /// Absolute path of the executable.
    pub executable: PathBuf,
    /// Probable source file, if one was found.
    pub source: Option<PathBuf>,
    /// Path of the executable relative to its root.
    pub relative_path: String,
}

impl TestLeaf {
    pub fn new(executable: PathBuf, relative: &Path, source: Option<PathBuf>) -> Self {
        let label = executable
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| executable.display().to_string());

        Self {
            id: leaf_id(&executable),
            label,
            executable,
            source,
            relative_path: relative.to_string_lossy().to_string(),
        }
    }
}

/// Stable id for a leaf.
pub fn leaf_id(executable: &Path) -> String {
    stable_id("leaf", &executable.to_string_lossy())
}

fn stable_id(kind: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{kind}-{}", &digest[..ID_LEN])
}

/// The ordered forest of discovered tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestTree {
    pub roots: Vec<TestNode>,
}

impl TestTree {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// All leaves in tree order.
    pub fn leaves(&self) -> Vec<&TestLeaf> {
        let mut out = Vec::new();
        collect_leaves(&self.roots, &mut out);
        out
    }

    /// Finds a node by id.
    pub fn find(&self, id: &str) -> Option<&TestNode> {
        let mut stack: Vec<&TestNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.id() == id {
                return Some(node);
            }
            if let TestNode::Group(group) = node {
                stack.extend(group.children.iter().rev());
            }
        }
        None
    }

    /// Finds a leaf by id.
    pub fn find_leaf(&self, id: &str) -> Option<&TestLeaf> {
        match self.find(id)? {
            TestNode::Leaf(leaf) => Some(leaf),
            TestNode::Group(_) => None,
        }
    }

    /// Expands a selection of node ids into leaves.
    ///
    /// An empty selection means every leaf. Group ids expand to all leaves
    /// beneath them; unknown ids are ignored. Each leaf appears once, in tree
    /// order of first selection.
    pub fn select(&self, ids: &[String]) -> Vec<&TestLeaf> {
        if ids.is_empty() {
            return self.leaves();
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            let Some(node) = self.find(id) else {
                debug!("Ignoring unknown test id {}", id);
                continue;
            };
            let mut leaves = Vec::new();
            collect_leaves(std::slice::from_ref(node), &mut leaves);
            for leaf in leaves {
                if seen.insert(leaf.id.as_str()) {
                    out.push(leaf);
                }
            }
        }
        out
    }

    /// Renders the tree as an indented outline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_nodes(&self.roots, "", &mut out);
        out
    }
}

fn collect_leaves<'a>(nodes: &'a [TestNode], out: &mut Vec<&'a TestLeaf>) {
    for node in nodes {
        match node {
            TestNode::Leaf(leaf) => out.push(leaf),
            TestNode::Group(group) => collect_leaves(&group.children, out),
        }
    }
}

fn render_nodes(nodes: &[TestNode], prefix: &str, out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        let connector = if is_last { "└── " } else { "├── " };
        out.push_str(prefix);
        out.push_str(connector);

        match node {
            TestNode::Leaf(leaf) => {
                out.push_str(&format!("{}  [{}]", leaf.label, leaf.id));
                if let Some(source) = &leaf.source {
                    out.push_str(&format!("  {}", source.display()));
                }
                out.push('\n');
            }
            TestNode::Group(group) => {
                out.push_str(&group.label);
                if let Some(description) = &group.description {
                    out.push_str(&format!("  ({description})"));
                }
                out.push('\n');
                let child_prefix = if is_last {
                    format!("{prefix}    ")
                } else {
                    format!("{prefix}│   ")
                };
                render_nodes(&group.children, &child_prefix, out);
            }
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

enum Slot {
    Group(usize),
    Leaf(TestLeaf),
}

struct GroupDraft {
    id: String,
    label: String,
    description: Option<String>,
    slots: Vec<Slot>,
}

/// Assembles leaves into a [`TestTree`].
///
/// Groups are drafted in an arena and linked by index so directory groups
/// can be looked up and extended while the tree is still growing.
#[derive(Default)]
pub struct TreeBuilder {
    drafts: Vec<GroupDraft>,
    top: Vec<usize>,
    label_groups: HashMap<String, usize>,
    dir_groups: HashMap<(usize, PathBuf), usize>,
    leaf_ids: HashSet<String>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn draft(&mut self, key: &str, label: String, description: Option<String>) -> usize {
        self.drafts.push(GroupDraft {
            id: stable_id("group", key),
            label,
            description,
            slots: Vec::new(),
        });
        self.drafts.len() - 1
    }

    /// Creates the group a root's leaves hang from. Returns its handle.
    pub fn add_root(&mut self, root: &ResolvedRoot) -> usize {
        let label = root.effective_label();
        let root_key = format!("root:{}", root.dir.display());
        let description = Some(root.dir.display().to_string());

        if !root.spec.group_by_label {
            let group = self.draft(&format!("{root_key}#{}", root.index), label, description);
            self.top.push(group);
            return group;
        }

        let label_key = format!("label:{label}");
        let parent = match self.label_groups.get(&label) {
            Some(&existing) => existing,
            None => {
                let group = self.draft(&label_key, label.clone(), None);
                self.top.push(group);
                self.label_groups.insert(label, group);
                group
            }
        };

        let raw = root.spec.location.raw().trim();
        let sub_label = if raw.is_empty() { ".".to_string() } else { raw.to_string() };
        let group = self.draft(
            &format!("{label_key}/{root_key}#{}", root.index),
            sub_label,
            description,
        );
        self.drafts[parent].slots.push(Slot::Group(group));
        group
    }

    /// Adds a leaf under `root_group`, creating directory groups for its
    /// relative path as needed.
    pub fn add_leaf(&mut self, root_group: usize, leaf: TestLeaf) {
        if !self.leaf_ids.insert(leaf.id.clone()) {
            debug!(
                "Skipping {}: already discovered under another root",
                leaf.executable.display()
            );
            return;
        }

        let mut parent = root_group;
        let mut dir = PathBuf::new();
        let relative = PathBuf::from(&leaf.relative_path);
        let segments: Vec<String> = relative
            .parent()
            .map(|p| {
                p.iter()
                    .map(|s| s.to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();

        for segment in segments {
            dir.push(&segment);
            let key = (root_group, dir.clone());
            parent = match self.dir_groups.get(&key) {
                Some(&existing) => existing,
                None => {
                    let id_key = format!("{}/dir:{}", self.drafts[root_group].id, dir.display());
                    let group = self.draft(&id_key, segment, None);
                    self.drafts[parent].slots.push(Slot::Group(group));
                    self.dir_groups.insert(key, group);
                    group
                }
            };
        }

        self.drafts[parent].slots.push(Slot::Leaf(leaf));
    }

    /// Consumes the builder and links the drafts into a tree.
    pub fn build(mut self) -> TestTree {
        let top = std::mem::take(&mut self.top);
        let roots = top
            .into_iter()
            .map(|index| TestNode::Group(self.take_group(index)))
            .collect();
        TestTree { roots }
    }

    fn take_group(&mut self, index: usize) -> TestGroup {
        let slots = std::mem::take(&mut self.drafts[index].slots);
        let children = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Group(child) => TestNode::Group(self.take_group(child)),
                Slot::Leaf(leaf) => TestNode::Leaf(leaf),
            })
            .collect();

        let draft = &mut self.drafts[index];
        TestGroup {
            id: std::mem::take(&mut draft.id),
            label: std::mem::take(&mut draft.label),
            description: draft.description.take(),
            children,
        }
    }
}
