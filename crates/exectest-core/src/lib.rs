#[cfg(not(unix))]
compile_error!("exectest-core needs Unix process groups and signals");

pub mod config;
pub mod debug;
pub mod discovery;
pub mod exec;
pub mod resolve;
pub mod session;
pub mod source_map;
pub mod tree;

pub use config::{create_default_config, ConfigError, RootLocation, RootSpec, TestConfig};
pub use debug::{CommandDebugger, Debugger, DebuggerBackend};
pub use exec::{CancelToken, Executor, KillPolicy, OutputChunk, RunResult};
pub use resolve::ResolvedRoot;
pub use session::{ConfigWatcher, DiscoveryReport, RunReporter, RunSummary, Session, SessionError};
pub use tree::{TestGroup, TestLeaf, TestNode, TestTree};
