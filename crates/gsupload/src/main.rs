mod content_type;
mod upload;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser};
use gsupload_auth::{AuthConfig, ClientFactory, CredentialSource};
use tracing::info;

use crate::upload::{DEFAULT_STORAGE_URL, StorageObject, Uploader};

const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

#[derive(Parser, Debug)]
#[command(name = "gsupload")]
#[command(author, version, about = "Upload files to a Cloud Storage bucket", long_about = None)]
struct Args {
    /// OAuth client id; overrides --clientid-file
    #[arg(long)]
    clientid: Option<String>,

    /// File holding the OAuth client id
    #[arg(long, default_value = "clientid.dat")]
    clientid_file: PathBuf,

    /// OAuth client secret; overrides --secret-file
    #[arg(long)]
    secret: Option<String>,

    /// File holding the OAuth client secret
    #[arg(long, default_value = "clientsecret.dat")]
    secret_file: PathBuf,

    /// Cache the OAuth token on disk
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    cachetoken: bool,

    /// Echo all HTTP traffic to stdout
    #[arg(long)]
    debug: bool,

    /// OAuth scope to request
    #[arg(long, default_value = DEFAULT_SCOPE)]
    scope: String,

    /// Cloud project the bucket belongs to
    #[arg(long)]
    project_id: String,

    /// Destination bucket
    #[arg(long)]
    bucket: String,

    /// Prepended to each file name to form the object path
    #[arg(long, default_value = "")]
    prefix: String,

    /// Give up on the browser redirect after this many seconds
    #[arg(long)]
    callback_timeout_secs: Option<u64>,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = AuthConfig {
        cache_tokens: args.cachetoken,
        echo_traffic: args.debug,
        callback_timeout: args.callback_timeout_secs.map(Duration::from_secs),
        ..AuthConfig::from_env()
    };

    let client = ClientFactory::new(config)
        .client_for(
            &CredentialSource::new(args.clientid, args.clientid_file),
            &CredentialSource::new(args.secret, args.secret_file),
            &args.scope,
        )
        .await
        .context("failed to obtain an authorized client")?;

    let storage_url =
        std::env::var("GSUPLOAD_STORAGE_URL").unwrap_or_else(|_| DEFAULT_STORAGE_URL.to_string());
    let uploader = Uploader::new(args.project_id, client).with_storage_url(storage_url);

    for file in &args.files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let object = StorageObject {
            bucket: args.bucket.clone(),
            path: object_path(&args.prefix, file)?,
            bytes,
        };
        uploader
            .put(&object)
            .await
            .with_context(|| format!("failed to upload {}", file.display()))?;
    }

    info!(count = args.files.len(), bucket = %args.bucket, "all files uploaded");
    Ok(())
}

/// `<prefix><file name>` for a local file.
fn object_path(prefix: &str, file: &Path) -> anyhow::Result<String> {
    let name = file
        .file_name()
        .with_context(|| format!("{} has no file name", file.display()))?;
    Ok(format!("{prefix}{}", name.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_uses_prefix_and_file_name() {
        assert_eq!(
            object_path("backups/", Path::new("/var/tmp/db.tar.gz")).unwrap(),
            "backups/db.tar.gz"
        );
        assert_eq!(object_path("", Path::new("notes.txt")).unwrap(), "notes.txt");
    }

    #[test]
    fn path_without_file_name_is_rejected() {
        assert!(object_path("x/", Path::new("/")).is_err());
    }

    #[test]
    fn cachetoken_defaults_on_and_can_be_disabled() {
        let args = Args::parse_from([
            "gsupload", "--project-id", "p", "--bucket", "b", "a.txt",
        ]);
        assert!(args.cachetoken);
        assert_eq!(args.scope, DEFAULT_SCOPE);

        let args = Args::parse_from([
            "gsupload", "--cachetoken", "false", "--project-id", "p", "--bucket", "b", "a.txt",
        ]);
        assert!(!args.cachetoken);
    }

    #[test]
    fn files_are_required() {
        assert!(Args::try_parse_from(["gsupload", "--project-id", "p", "--bucket", "b"]).is_err());
    }
}
