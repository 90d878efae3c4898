use crate::cluster::Kind;
use crate::constants;
use std::env;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Process-level settings resolved once at startup from environment
/// variables (names in [`crate::constants`]).
#[derive(Clone, Debug)]
pub struct PlatformContext {
    pub kubernetes: KubernetesSettings,
    pub messaging: MessagingSettings,
    pub storage: StorageSettings,
    pub notifications: NotificationTransportSettings,
    pub sql_connection_string: Option<String>,
}

#[derive(Clone, Debug)]
pub struct KubernetesSettings {
    pub provider: Kind,
    pub kubeconfig_path: Option<String>,
    pub container_registry: String,
}

#[derive(Clone, Debug)]
pub struct MessagingSettings {
    pub provider: String,
    pub bootstrap_servers: String,
    pub test_results_topic: String,
}

#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub connection_string: Option<String>,
    pub test_results_container: String,
}

#[derive(Clone, Debug)]
pub struct NotificationTransportSettings {
    pub sendgrid_api_key: Option<String>,
    pub sender_email: Option<String>,
}

impl PlatformContext {
    pub fn from_env() -> Self {
        let provider = match env_or(constants::KUBERNETES_PROVIDER, "aks").to_lowercase().as_str() {
            "openshift" => Kind::OpenShift,
            _ => Kind::Aks,
        };

        PlatformContext {
            kubernetes: KubernetesSettings {
                provider,
                kubeconfig_path: env::var(constants::KUBECONFIG_PATH).ok(),
                container_registry: env_or(constants::CONTAINER_REGISTRY, constants::DEFAULT_CONTAINER_REGISTRY),
            },
            messaging: MessagingSettings {
                provider: env_or(constants::MESSAGING_PROVIDER, "kafka"),
                bootstrap_servers: env_or(constants::KAFKA_BOOTSTRAP_SERVERS, "localhost:9092"),
                test_results_topic: env_or(constants::TEST_RESULTS_TOPIC, constants::DEFAULT_TEST_RESULTS_TOPIC),
            },
            storage: StorageSettings {
                connection_string: env::var(constants::STORAGE_CONNECTION_STRING).ok(),
                test_results_container: env_or(
                    constants::TEST_RESULTS_CONTAINER,
                    constants::DEFAULT_TEST_RESULTS_CONTAINER,
                ),
            },
            notifications: NotificationTransportSettings {
                sendgrid_api_key: env::var(constants::SENDGRID_API_KEY).ok(),
                sender_email: env::var(constants::SENDGRID_SENDER_EMAIL).ok(),
            },
            sql_connection_string: env::var(constants::SQL_CONNECTION_STRING).ok(),
        }
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        PlatformContext {
            kubernetes: KubernetesSettings {
                provider: Kind::Aks,
                kubeconfig_path: None,
                container_registry: constants::DEFAULT_CONTAINER_REGISTRY.to_string(),
            },
            messaging: MessagingSettings {
                provider: "kafka".to_string(),
                bootstrap_servers: "localhost:9092".to_string(),
                test_results_topic: constants::DEFAULT_TEST_RESULTS_TOPIC.to_string(),
            },
            storage: StorageSettings {
                connection_string: None,
                test_results_container: constants::DEFAULT_TEST_RESULTS_CONTAINER.to_string(),
            },
            notifications: NotificationTransportSettings {
                sendgrid_api_key: None,
                sender_email: None,
            },
            sql_connection_string: None,
        }
    }
}
