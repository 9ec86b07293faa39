use std::{collections::HashMap, path::PathBuf};

use crate::prelude::*;


/// File system locations. Relative paths are relative to this config file.
#[derive(Debug, confique::Config)]
pub struct PathsConfig {
    /// Location of the documentation sources.
    #[config(default = "../docs")]
    pub docs_root: PathBuf,

    /// Where uploaded media (e.g. image attachments) is stored.
    #[config(default = "media")]
    pub media_root: PathBuf,

    /// Where custom reports are stored.
    #[config(default = "reports")]
    pub reports_root: PathBuf,

    /// Where custom scripts are stored.
    #[config(default = "scripts")]
    pub scripts_root: PathBuf,

    /// If set, sessions are stored as files in this directory instead of in
    /// the database. Useful for read-only database replicas.
    pub session_file_path: Option<PathBuf>,
}

/// Removes trailing slashes from a path, leaving a bare root alone.
pub(crate) fn strip_trailing_slash(path: &mut PathBuf) {
    let Some(s) = path.to_str() else {
        return;
    };

    let trimmed = s.trim_end_matches('/');
    if trimmed.len() != s.len() && !trimmed.is_empty() {
        *path = PathBuf::from(trimmed);
    }
}


/// Alternative storage backend for uploaded media.
#[derive(Debug, confique::Config)]
pub struct StorageConfig {
    /// Name of the storage backend, e.g. "storages.backends.s3boto3.S3Boto3Storage".
    /// If not set, files are stored in `paths.media_root`.
    pub backend: Option<String>,

    /// Backend specific parameters. Only used if `backend` is set. Example:
    ///
    ///     [storage.config]
    ///     AWS_ACCESS_KEY_ID = "Key ID"
    ///     AWS_STORAGE_BUCKET_NAME = "netbox"
    #[config(default = {})]
    pub config: HashMap<String, serde_json::Value>,
}

impl StorageConfig {
    pub(crate) fn lint(&self) {
        if !self.config.is_empty() && self.backend.is_none() {
            warn!("'storage.config' has been set but 'storage.backend' is not defined. \
                'storage.config' will be ignored.");
        }
    }
}


#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::strip_trailing_slash;

    #[test]
    fn trailing_slashes_are_removed() {
        let cases = [
            ("/opt/netbox/media/", "/opt/netbox/media"),
            ("/opt/netbox/media//", "/opt/netbox/media"),
            ("/opt/netbox/media", "/opt/netbox/media"),
            ("reports/", "reports"),
            ("/", "/"),
        ];

        for (input, expected) in cases {
            let mut path = PathBuf::from(input);
            strip_trailing_slash(&mut path);
            assert_eq!(path, PathBuf::from(expected), "input: {input}");
        }
    }
}
