/// Library name
pub const LIB_NAME: &str = "tessel";

/// Library version
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Id of a root context built without an explicit id
pub const ROOT_CONTEXT_ID: &str = "kernel";

/// Length of the random suffix appended to a fork's id
pub const FORK_SUFFIX_LEN: usize = 6;

/// Emitted on the owning context when a local write changes a value
pub const STATE_MUTATE: &str = "state:mutate";

/// Emitted after a successful `start()`
pub const KERNEL_START: &str = "kernel:start";

/// Emitted after a successful `stop()`
pub const KERNEL_STOP: &str = "kernel:stop";

/// Default prefix for process environment variables imported into state
pub const ENV_PREFIX: &str = "TESSEL_";
