// Environment variable names understood by `PlatformContext::from_env`.
pub const SQL_CONNECTION_STRING: &str = "TESTEXEC_SQL_CONNECTION_STRING";
pub const KUBERNETES_PROVIDER: &str = "TESTEXEC_KUBERNETES_PROVIDER";
pub const KUBECONFIG_PATH: &str = "TESTEXEC_KUBECONFIG_PATH";
pub const CONTAINER_REGISTRY: &str = "TESTEXEC_CONTAINER_REGISTRY";
pub const MESSAGING_PROVIDER: &str = "TESTEXEC_MESSAGING_PROVIDER";
pub const KAFKA_BOOTSTRAP_SERVERS: &str = "TESTEXEC_KAFKA_BOOTSTRAP_SERVERS";
pub const TEST_RESULTS_TOPIC: &str = "TESTEXEC_TEST_RESULTS_TOPIC";
pub const STORAGE_CONNECTION_STRING: &str = "TESTEXEC_STORAGE_CONNECTION_STRING";
pub const TEST_RESULTS_CONTAINER: &str = "TESTEXEC_TEST_RESULTS_CONTAINER";
pub const SENDGRID_API_KEY: &str = "TESTEXEC_SENDGRID_API_KEY";
pub const SENDGRID_SENDER_EMAIL: &str = "TESTEXEC_SENDGRID_SENDER_EMAIL";

/// Compiled-in namespace prefix, used when the admin configuration cannot be
/// read from a synchronous context.
pub const DEFAULT_LOB_NAMESPACE_PREFIX: &str = "testexec-";

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "testexec-system";
pub const DEFAULT_CONTAINER_REGISTRY: &str = "registry.local:5000";
pub const DEFAULT_TEST_RESULTS_TOPIC: &str = "test-results-metadata";
pub const DEFAULT_TEST_RESULTS_CONTAINER: &str = "test-results";
