// ABOUTME: Bollard-based workload controller for Docker and Podman.
// ABOUTME: Each color is a set of labelled containers named <env>-<color>-<n>.

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, InspectNetworkOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use parking_lot::Mutex;
use snafu::ResultExt;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::WorkloadConfig;
use crate::types::{Color, ContainerId, EnvironmentName, ImageRef};

use super::detection::{RuntimeInfo, RuntimeType, detect};
use super::error::{ConnectError, ConnectionSnafu, WorkloadError};
use super::WorkloadController;

pub const LABEL_MANAGED: &str = "switchyard.managed";
pub const LABEL_ENVIRONMENT: &str = "switchyard.environment";
pub const LABEL_COLOR: &str = "switchyard.color";
pub const LABEL_REPLICA: &str = "switchyard.replica";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Container settings shared by every replica.
#[derive(Debug, Clone, Default)]
pub struct WorkloadSettings {
    pub network: Option<String>,
    pub env: HashMap<String, String>,
    pub stop_timeout: Duration,
}

impl From<&WorkloadConfig> for WorkloadSettings {
    fn from(config: &WorkloadConfig) -> Self {
        Self {
            network: config.network.clone(),
            env: config.env.clone(),
            stop_timeout: config.stop_timeout,
        }
    }
}

/// Stop timeout in whole seconds, saturating at the API's `i32` range.
fn stop_timeout_secs(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX)
}

#[derive(Debug, Clone, Default)]
struct Desired {
    replicas: u32,
    image: Option<ImageRef>,
}

#[derive(Debug, Clone)]
struct Replica {
    id: ContainerId,
    index: u32,
    image: String,
    running: bool,
}

pub struct DockerWorkload {
    client: Docker,
    runtime_type: RuntimeType,
    settings: WorkloadSettings,
    desired: Mutex<HashMap<(EnvironmentName, Color), Desired>>,
}

impl std::fmt::Debug for DockerWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerWorkload")
            .field("runtime_type", &self.runtime_type)
            .finish()
    }
}

impl DockerWorkload {
    pub fn new(client: Docker, runtime_type: RuntimeType, settings: WorkloadSettings) -> Self {
        Self {
            client,
            runtime_type,
            settings,
            desired: Mutex::new(HashMap::new()),
        }
    }

    /// Connect using detected runtime info.
    pub fn connect(info: &RuntimeInfo, settings: WorkloadSettings) -> Result<Self, ConnectError> {
        let client =
            Docker::connect_with_unix(&info.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .context(ConnectionSnafu)?;
        Ok(Self::new(client, info.runtime_type, settings))
    }

    /// Detect the runtime from `config`, connect and ping it.
    pub async fn from_config(config: &WorkloadConfig) -> Result<Self, ConnectError> {
        let info = detect(config.runtime, config.socket.as_deref())?;
        let workload = Self::connect(&info, WorkloadSettings::from(config))?;
        workload.client.ping().await.context(ConnectionSnafu)?;
        tracing::debug!(runtime = %info.runtime_type, socket = %info.socket_path, "connected to container runtime");
        Ok(workload)
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    fn container_name(environment: &EnvironmentName, color: Color, index: u32) -> String {
        format!("{environment}-{color}-{index}")
    }

    fn desired(&self, environment: &EnvironmentName, color: Color) -> Desired {
        self.desired
            .lock()
            .get(&(environment.clone(), color))
            .cloned()
            .unwrap_or_default()
    }

    fn update_desired(
        &self,
        environment: &EnvironmentName,
        color: Color,
        f: impl FnOnce(&mut Desired),
    ) {
        f(self
            .desired
            .lock()
            .entry((environment.clone(), color))
            .or_default());
    }

    /// Managed containers of one color, running or not, ordered by replica index.
    async fn replicas(
        &self,
        environment: &EnvironmentName,
        color: Color,
    ) -> Result<Vec<Replica>, WorkloadError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![
                format!("{LABEL_MANAGED}=true"),
                format!("{LABEL_ENVIRONMENT}={environment}"),
                format!("{LABEL_COLOR}={color}"),
            ],
        );
        let opts = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        // Podman reports transient "stopping" states bollard cannot deserialize.
        let mut last_error = None;
        for attempt in 0..3 {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => {
                    let mut replicas: Vec<Replica> = containers
                        .into_iter()
                        .map(|c| {
                            let labels = c.labels.unwrap_or_default();
                            let state = c
                                .state
                                .map(|s| format!("{:?}", s).to_lowercase())
                                .unwrap_or_default();
                            Replica {
                                id: ContainerId::new(c.id.unwrap_or_default()),
                                index: labels
                                    .get(LABEL_REPLICA)
                                    .and_then(|i| i.parse().ok())
                                    .unwrap_or(u32::MAX),
                                image: c.image.unwrap_or_default(),
                                running: state == "running",
                            }
                        })
                        .collect();
                    replicas.sort_by_key(|r| r.index);
                    return Ok(replicas);
                }
                Err(e) => {
                    let err_str = e.to_string();
                    if err_str.contains("unknown variant `stopping`") && attempt < 2 {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        last_error = Some(err_str);
                        continue;
                    }
                    return Err(WorkloadError::Runtime(err_str));
                }
            }
        }

        Err(WorkloadError::Runtime(
            last_error.unwrap_or_else(|| "list_containers failed".to_string()),
        ))
    }

    async fn create_replica(
        &self,
        environment: &EnvironmentName,
        color: Color,
        index: u32,
        image: &str,
    ) -> Result<(), WorkloadError> {
        let name = Self::container_name(environment, color, index);

        let labels = HashMap::from([
            (LABEL_MANAGED.to_string(), "true".to_string()),
            (LABEL_ENVIRONMENT.to_string(), environment.to_string()),
            (LABEL_COLOR.to_string(), color.to_string()),
            (LABEL_REPLICA.to_string(), index.to_string()),
        ]);
        let env: Vec<String> = self
            .settings
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let body = ContainerCreateBody {
            image: Some(image.to_string()),
            env: if env.is_empty() { None } else { Some(env) },
            labels: Some(labels),
            host_config: Some(HostConfig {
                network_mode: self.settings.network.clone(),
                ..Default::default()
            }),
            stop_timeout: Some(i64::from(stop_timeout_secs(self.settings.stop_timeout))),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(name.clone()),
                    ..Default::default()
                }),
                body,
            )
            .await
            .map_err(|e| WorkloadError::Container {
                container: name.clone(),
                message: e.to_string(),
            })?;

        self.start(&response.id, &name).await
    }

    async fn start(&self, id: &str, name: &str) -> Result<(), WorkloadError> {
        self.client
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| WorkloadError::Container {
                container: name.to_string(),
                message: e.to_string(),
            })
    }

    async fn stop(&self, replica: &Replica) -> Result<(), WorkloadError> {
        let opts = StopContainerOptions {
            t: Some(stop_timeout_secs(self.settings.stop_timeout)),
            signal: None,
        };
        match self.client.stop_container(replica.id.as_str(), Some(opts)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(WorkloadError::Container {
                container: replica.id.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn remove(&self, replica: &Replica) -> Result<(), WorkloadError> {
        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.client.remove_container(replica.id.as_str(), Some(opts)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(WorkloadError::Container {
                container: replica.id.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn pull(&self, image: &ImageRef) -> Result<(), WorkloadError> {
        let image_name = image.to_string();
        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| WorkloadError::ImagePull {
                image: image_name.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Whether the container is running and, if it has a healthcheck, healthy.
    async fn is_ready(&self, replica: &Replica) -> Result<bool, WorkloadError> {
        let details = self
            .client
            .inspect_container(replica.id.as_str(), None::<InspectContainerOptions>)
            .await?;
        let Some(state) = details.state else {
            return Ok(false);
        };

        let running = state.status == Some(bollard::models::ContainerStateStatusEnum::RUNNING);
        let healthy = match state.health.and_then(|h| h.status) {
            None
            | Some(bollard::models::HealthStatusEnum::EMPTY)
            | Some(bollard::models::HealthStatusEnum::NONE) => true,
            Some(status) => status == bollard::models::HealthStatusEnum::HEALTHY,
        };
        Ok(running && healthy)
    }
}

#[async_trait]
impl WorkloadController for DockerWorkload {
    async fn check_environment(&self, environment: &EnvironmentName) -> Result<(), WorkloadError> {
        self.client
            .ping()
            .await
            .map_err(|e| WorkloadError::Unavailable(e.to_string()))?;

        if let Some(ref network) = self.settings.network {
            match self
                .client
                .inspect_network(network, None::<InspectNetworkOptions>)
                .await
            {
                Ok(_) => {}
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    return Err(WorkloadError::NotProvisioned(format!(
                        "{environment}: network {network} does not exist"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn scale_to(
        &self,
        environment: &EnvironmentName,
        color: Color,
        replicas: u32,
    ) -> Result<(), WorkloadError> {
        self.update_desired(environment, color, |d| d.replicas = replicas);
        let existing = self.replicas(environment, color).await?;

        for replica in existing.iter().filter(|r| r.index >= replicas && r.running) {
            self.stop(replica).await?;
        }
        if replicas == 0 {
            tracing::debug!(%environment, %color, "scaled to zero");
            return Ok(());
        }

        let known_image = self
            .desired(environment, color)
            .image
            .map(|i| i.to_string())
            .or_else(|| existing.first().map(|r| r.image.clone()));

        for index in 0..replicas {
            match existing.iter().find(|r| r.index == index) {
                Some(replica) if !replica.running => {
                    let name = Self::container_name(environment, color, index);
                    self.start(replica.id.as_str(), &name).await?;
                }
                Some(_) => {}
                None => {
                    // Without a known image the next rollout creates the replica.
                    if let Some(ref image) = known_image {
                        self.create_replica(environment, color, index, image).await?;
                    }
                }
            }
        }
        tracing::debug!(%environment, %color, replicas, "scaled");
        Ok(())
    }

    async fn set_image(
        &self,
        environment: &EnvironmentName,
        color: Color,
        image: &ImageRef,
    ) -> Result<(), WorkloadError> {
        self.update_desired(environment, color, |d| d.image = Some(image.clone()));
        Ok(())
    }

    async fn trigger_rollout(
        &self,
        environment: &EnvironmentName,
        color: Color,
    ) -> Result<(), WorkloadError> {
        let desired = self.desired(environment, color);
        let image = desired.image.ok_or_else(|| {
            WorkloadError::Runtime(format!("no image set for {environment}-{color}"))
        })?;
        self.pull(&image).await?;

        let image_name = image.to_string();
        let existing = self.replicas(environment, color).await?;
        for replica in &existing {
            self.remove(replica).await?;
        }
        for index in 0..desired.replicas.max(1) {
            self.create_replica(environment, color, index, &image_name)
                .await?;
        }
        tracing::info!(%environment, %color, image = %image_name, "rollout started");
        Ok(())
    }

    async fn wait_for_rollout(
        &self,
        environment: &EnvironmentName,
        color: Color,
        timeout: Duration,
    ) -> Result<(), WorkloadError> {
        let expected = self.desired(environment, color).replicas.max(1) as usize;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let replicas = self.replicas(environment, color).await?;
            let mut ready = 0;
            for replica in &replicas {
                if self.is_ready(replica).await? {
                    ready += 1;
                }
            }
            if ready >= expected {
                return Ok(());
            }

            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Err(WorkloadError::RolloutTimeout {
                    target: format!("{environment}-{color}"),
                    timeout,
                });
            }
            tracing::debug!(%environment, %color, ready, expected, "waiting for rollout");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
