//! azfiles: command-line access to file shares and blobs.

use chrono::Duration;
use clap::Parser;
use serde_json::json;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use azfiles_rs::models::{
    MetricsConfig, MetricsGranularity, MetricsLevel, Quota, SasPermissions, SharedAccessPolicy,
};
use azfiles_rs::{
    Args, ClientOptions, Command, ConnectionConfig, CopySource, DownloadMode, SasGrant,
    ShareHandle, StorageAccount, StorageResult,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    // RUST_LOG wins over the command-line level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ConnectionConfig::parse(&args.connection_string)?;
    let account = StorageAccount::new(config, ClientOptions::from(&args))?;

    let output = run(&account, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_policy(permissions: &str, hours: i64) -> StorageResult<SharedAccessPolicy> {
    Ok(SharedAccessPolicy::valid_for(
        SasPermissions::parse(permissions)?,
        Duration::hours(hours),
    ))
}

/// Creates every directory above `path` that is missing.
async fn ensure_parents(share: &ShareHandle, path: &str) -> StorageResult<()> {
    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for depth in 1..components.len() {
        share
            .directory(&components[..depth].join("/"))
            .create_if_not_exists()
            .await?;
    }
    Ok(())
}

async fn run(account: &StorageAccount, command: Command) -> Result<serde_json::Value, BoxError> {
    let files = account.file_service_client();

    let output = match command {
        Command::CreateShare { share } => {
            let created = files.share(&share).create_if_not_exists().await?;
            json!({ "share": share, "created": created })
        }
        Command::Stats { share } => {
            let stats = files.share(&share).get_stats().await?;
            json!({
                "share": share,
                "usage_bytes": stats.usage_bytes,
                "usage_gib": stats.usage_gib(),
            })
        }
        Command::Quota { share, gib } => {
            let handle = files.share(&share);
            let mut properties = handle.fetch_properties().await?;
            properties.set_quota(gib.map(Quota::Limit).unwrap_or(Quota::Unset));
            handle.set_properties(&properties).await?;
            serde_json::to_value(&properties)?
        }
        Command::Upload { share, path, text } => {
            let handle = files.share(&share);
            ensure_parents(&handle, &path).await?;
            handle.file(&path).upload_text(&text).await?;
            json!({ "share": share, "path": path, "bytes": text.len() })
        }
        Command::Download {
            share,
            path,
            destination,
            append,
        } => {
            let mode = if append {
                DownloadMode::Append
            } else {
                DownloadMode::Overwrite
            };
            let written = files
                .share(&share)
                .file(&path)
                .download_to_local(&destination, mode)
                .await?;
            json!({ "destination": destination, "bytes": written })
        }
        Command::Exists { share, path } => {
            let exists = files.share(&share).file(&path).exists().await?;
            json!({ "share": share, "path": path, "exists": exists })
        }
        Command::Sas {
            share,
            path,
            permissions,
            hours,
            policy,
        } => {
            let grant = match policy {
                Some(id) => SasGrant::stored(id),
                None => SasGrant::AdHoc(read_policy(&permissions, hours)?),
            };
            let url = files.share(&share).file(&path).sas_url(&grant)?;
            json!({ "url": url.as_str() })
        }
        Command::AddPolicy {
            share,
            id,
            permissions,
            hours,
        } => {
            let policy = read_policy(&permissions, hours)?;
            files.share(&share).add_access_policy(&id, policy).await?;
            json!({ "share": share, "policy": id, "stored": true })
        }
        Command::RemovePolicy { share, id } => {
            let removed = files.share(&share).remove_access_policy(&id).await?;
            json!({ "share": share, "policy": id, "removed": removed })
        }
        Command::Copy {
            share,
            source,
            destination,
            to_container,
        } => {
            let source_file = files.share(&share).file(&source);
            let poll = std::time::Duration::from_secs(1);
            let state = match to_container {
                Some(container) => {
                    let container = account.blob_service_client().container(&container);
                    container.create_if_not_exists().await?;
                    // Crossing into the blob service needs a SAS on the source
                    let grant = SasGrant::AdHoc(SharedAccessPolicy::valid_for(
                        SasPermissions::read_only(),
                        Duration::hours(1),
                    ));
                    let source = source_file.copy_source_with_sas(&grant)?;
                    let blob = container.blob(&destination);
                    blob.start_copy(&source).await?;
                    blob.wait_for_copy(poll).await?
                }
                None => {
                    let handle = files.share(&share);
                    ensure_parents(&handle, &destination).await?;
                    let target = handle.file(&destination);
                    target.start_copy(&CopySource::from_file(&source_file)).await?;
                    target.wait_for_copy(poll).await?
                }
            };
            serde_json::to_value(&state)?
        }
        Command::Metrics {
            level,
            retention_days,
        } => {
            let metrics = MetricsConfig::new(MetricsLevel::parse(&level)?, retention_days);
            let mut properties = files.get_service_properties().await?;
            properties.set_metrics(MetricsGranularity::Hour, metrics.clone());
            properties.set_metrics(MetricsGranularity::Minute, metrics);
            files.set_service_properties(&properties).await?;
            serde_json::to_value(&properties)?
        }
    };

    Ok(output)
}
