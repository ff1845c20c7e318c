//! Binary entry point for the `sfvol` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::warn;

use sfvol::directory::DEFAULT_PAGE_SIZE;
use sfvol::{
    AccountId, ConfigError, CreateOptions, Deletion, DeviceBinding, DriverError, HostDriver,
    SolidFireConfig, Volume, VolumeId,
};

mod cli;

use cli::{Cli, Command, CreateCommand, ListCommand, VolumeCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("{failed} of {total} volume deletions failed")]
    PartialDelete { failed: usize, total: usize },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
    if let Err(err) = installed {
        writeln!(io::stderr(), "failed to install log subscriber: {err}").ok();
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = SolidFireConfig::load_without_cli_args()?;
    let driver = HostDriver::from_config(&config).await?;
    match cli.command {
        Command::Volume(command) => run_volume_command(&driver, command).await,
    }
}

async fn run_volume_command(driver: &HostDriver, command: VolumeCommand) -> Result<(), CliError> {
    match command {
        VolumeCommand::Create(args) => {
            let volume = create_volume(driver, args).await?;
            write_volume(io::stdout().lock(), &volume)?;
        }
        VolumeCommand::List(args) => {
            let volumes = list_volumes(driver, &args).await?;
            write_volumes(io::stdout().lock(), &volumes)?;
        }
        VolumeCommand::Delete(args) => delete_volumes(driver, &args.ids).await?,
        VolumeCommand::Attach(args) => {
            let volume_id = VolumeId::new(args.id);
            let binding = driver
                .attach_by_id(volume_id, args.iface.as_deref())
                .await?;
            write_binding(io::stdout().lock(), volume_id, &binding)?;
        }
        VolumeCommand::Detach(args) => {
            driver.detach_by_id(VolumeId::new(args.id)).await?;
            writeln!(io::stdout(), "detached volume {}", args.id)?;
        }
        VolumeCommand::Mount(args) => {
            let mountpoint = driver.mount(&args.name).await?;
            writeln!(io::stdout(), "{mountpoint}")?;
        }
        VolumeCommand::Unmount(args) => {
            driver.unmount(&args.name).await?;
            writeln!(io::stdout(), "unmounted {}", args.name)?;
        }
    }
    Ok(())
}

async fn create_volume(driver: &HostDriver, args: CreateCommand) -> Result<Volume, CliError> {
    let options = CreateOptions {
        size_gib: args.size,
        qos: args.qos,
        volume_type: args.volume_type,
    };
    Ok(driver.create(&args.name, &options).await?)
}

async fn list_volumes(driver: &HostDriver, args: &ListCommand) -> Result<Vec<Volume>, CliError> {
    let directory = driver.volumes();
    let volumes = if let Some(account) = args.account {
        directory.list_for_account(AccountId::new(account)).await
    } else if args.start_id.is_some() || args.limit.is_some() {
        let start = VolumeId::new(args.start_id.unwrap_or_default());
        directory.list_active(start, args.limit).await
    } else {
        directory.list_all_active(DEFAULT_PAGE_SIZE).await
    };
    Ok(volumes.map_err(DriverError::from)?)
}

async fn delete_volumes(driver: &HostDriver, ids: &[i64]) -> Result<(), CliError> {
    let mut failed = 0_usize;
    for id in ids {
        let volume_id = VolumeId::new(*id);
        match driver.volumes().delete_volume(volume_id).await {
            Ok(outcome) => write_deletion(io::stdout().lock(), volume_id, outcome)?,
            Err(err) => {
                warn!(%volume_id, error = %err, "delete failed");
                writeln!(io::stderr(), "failed to delete volume {volume_id}: {err}").ok();
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(CliError::PartialDelete {
            failed,
            total: ids.len(),
        });
    }
    Ok(())
}

fn write_volume(mut target: impl Write, volume: &Volume) -> io::Result<()> {
    writeln!(target, "ID:        {}", volume.volume_id)?;
    writeln!(target, "Name:      {}", volume.name)?;
    writeln!(target, "Account:   {}", volume.account_id)?;
    writeln!(target, "Size:      {}", volume.total_size)?;
    writeln!(target, "Status:    {}", volume.status)?;
    writeln!(target, "IQN:       {}", volume.iqn)?;
    writeln!(
        target,
        "QoS:       {},{},{}",
        volume.qos.min_iops, volume.qos.max_iops, volume.qos.burst_iops
    )
}

fn write_volumes(mut target: impl Write, volumes: &[Volume]) -> io::Result<()> {
    writeln!(
        target,
        "{:<8} {:<32} {:<8} {:>14} STATUS",
        "ID", "NAME", "ACCOUNT", "SIZE"
    )?;
    for volume in volumes {
        writeln!(
            target,
            "{:<8} {:<32} {:<8} {:>14} {}",
            volume.volume_id.get(),
            volume.name,
            volume.account_id.get(),
            volume.total_size,
            volume.status
        )?;
    }
    Ok(())
}

fn write_binding(
    mut target: impl Write,
    volume_id: VolumeId,
    binding: &DeviceBinding,
) -> io::Result<()> {
    writeln!(target, "ID:        {volume_id}")?;
    writeln!(target, "Path:      {}", binding.host_path)?;
    writeln!(target, "Device:    {}", binding.device)?;
    writeln!(target, "Reused:    {}", binding.reused)
}

fn write_deletion(mut target: impl Write, volume_id: VolumeId, outcome: Deletion) -> io::Result<()> {
    match outcome {
        Deletion::Deleted => writeln!(target, "deleted volume {volume_id}"),
        Deletion::AlreadyAbsent => writeln!(target, "volume {volume_id} was already absent"),
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
