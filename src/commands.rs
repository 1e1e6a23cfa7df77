//! CLI commands for Droidcase
//!
//! One struct per subcommand, assembled from the member crates.

use std::path::{Path, PathBuf};

use anyhow::Result;
use droidcase_build_engine::{AppBackend, BuildError, GradleBackend, PackagingFormat};
use droidcase_device_bridge::{
    AdbClient, AndroidSdk, AppLauncher, AvdManager, LaunchOptions, TargetSelector,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::project::Project;

fn discover_sdk(project: &Project) -> Result<AndroidSdk> {
    let android = &project.config.android;
    let sdk = AndroidSdk::discover(android.sdk_root.clone())?
        .with_java_home(android.java_home.clone());
    Ok(sdk)
}

fn gradle_backend(project: &Project, sdk: &AndroidSdk) -> GradleBackend {
    let app = &project.config.app;
    GradleBackend::new(
        project.root.clone(),
        &app.name,
        &app.formal_name,
        &app.version,
        sdk.root().to_path_buf(),
    )
    .with_java_home(sdk.java_home().map(Path::to_path_buf))
}

/// Build the debug APK
pub struct BuildCommand;

impl BuildCommand {
    /// Execute the build command
    pub async fn execute(&self, project: &Project) -> Result<PathBuf> {
        let sdk = discover_sdk(project)?;
        let backend = gradle_backend(project, &sdk);
        let apk = backend.build().await?;
        Ok(apk)
    }
}

/// Build a distributable artefact
pub struct PackageCommand {
    /// Requested format: aab, apk or debug-apk
    pub packaging_format: String,
}

impl PackageCommand {
    /// Execute the package command
    pub async fn execute(&self, project: &Project) -> Result<PathBuf> {
        let format: PackagingFormat = self.packaging_format.parse()?;
        let sdk = discover_sdk(project)?;
        let backend = gradle_backend(project, &sdk);
        let dist = backend.package(format).await?;
        println!("{}", dist.display());
        Ok(dist)
    }
}

/// Run the app on a device or emulator
pub struct RunCommand {
    /// Device serial or @avdName hint
    pub device: Option<String>,
    /// Extra arguments for a cold emulator start
    pub extra_emulator_args: Vec<String>,
    /// Shut the emulator down when the run ends
    pub shutdown_on_exit: bool,
    /// Host ports to forward onto the device
    pub forward_ports: Vec<u16>,
    /// Device ports to reverse back to the host
    pub reverse_ports: Vec<u16>,
    /// Trailing arguments handed to the app
    pub passthrough: Vec<String>,
}

impl RunCommand {
    /// Execute the run command
    pub async fn execute(&self, project: &Project, cancel: CancellationToken) -> Result<()> {
        let app = &project.config.app;
        let run = &project.config.run;

        let sdk = discover_sdk(project)?;
        let backend = gradle_backend(project, &sdk);

        let artifact = backend.binary_path();
        if !artifact.is_file() {
            return Err(BuildError::ArtifactMissing(artifact).into());
        }

        let client = AdbClient::new(&sdk);
        let selector = TargetSelector::new(client.clone(), AvdManager::new(sdk));
        let (serial, name) = selector
            .resolve(
                self.device.as_deref(),
                &self.extra_emulator_args,
                run.boot_timeout(),
            )
            .await?;
        info!("Starting app on {name} (device ID {serial})");

        let options = LaunchOptions {
            package: app.application_id(),
            activity: app.main_activity.clone(),
            artifact,
            passthrough: self.passthrough.clone(),
            forward_ports: self.forward_ports.clone(),
            reverse_ports: self.reverse_ports.clone(),
            shutdown_on_exit: self.shutdown_on_exit,
            pid_timeout: run.pid_timeout(),
            pid_poll_interval: run.pid_poll_interval(),
            stop_poll_interval: run.stop_poll_interval(),
        };

        let channel = client.device(&serial);
        let mut out = std::io::stdout();
        AppLauncher::new(options)
            .run(&channel, &serial, cancel, &mut out)
            .await?;
        Ok(())
    }
}

/// List devices visible to ADB
pub struct DevicesCommand {
    /// SDK override from the manifest, when run inside a project
    pub sdk_root: Option<PathBuf>,
}

impl DevicesCommand {
    /// Execute the devices command
    pub async fn execute(&self) -> Result<()> {
        let sdk = AndroidSdk::discover(self.sdk_root.clone())?;
        let client = AdbClient::new(&sdk);
        let selector = TargetSelector::new(client, AvdManager::new(sdk));

        let candidates = selector.candidates().await?;
        if candidates.is_empty() {
            println!("No devices connected");
        } else {
            println!("Connected devices:");
            for candidate in &candidates {
                println!(
                    "  {} - {} [{:?}]",
                    candidate.serial, candidate.name, candidate.state
                );
            }
        }
        Ok(())
    }
}
