//! 租户配置：INI 配置文件中命名分节的读取、合并写入与枚举。
//!
//! 每个分节描述一个可独立运行的配置（存储目录、密码哈希、监听地址）。
//! 未命名配置对应 `[photobackup]`，命名配置对应 `[photobackup-<name>]`。

use ini::{EscapePolicy, Ini, ParseOption};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{CONFIG_FILE_NAME, SECTION_PREFIX, UNNAMED_TENANT_LABEL};

const KEY_BIND_ADDRESS: &str = "BindAddress";
const KEY_MEDIA_ROOT: &str = "MediaRoot";
const KEY_PASSWORD: &str = "Password";
const KEY_PASSWORD_BCRYPT: &str = "PasswordBcrypt";
const KEY_PORT: &str = "Port";
const KEY_HTTP_PREFIX: &str = "HTTPPrefix";

const REQUIRED_KEYS: [&str; 4] = [KEY_BIND_ADDRESS, KEY_MEDIA_ROOT, KEY_PASSWORD_BCRYPT, KEY_PORT];

/// One named configuration, immutable once the server starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantConfig {
    pub name: Option<String>,
    pub media_root: PathBuf,
    /// bcrypt 哈希；为空表示服务端未配置凭据。
    pub password_hash: String,
    /// 客户端实际提交的 SHA-512 摘要，仅供运维查看。
    pub password_digest: Option<String>,
    pub bind_address: String,
    pub port: u16,
    pub path_prefix: Option<String>,
}

impl TenantConfig {
    pub fn section_name(&self) -> String {
        section_name(self.name.as_deref())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("configuration file does not have a [{0}] section")]
    SectionMissing(String),
    #[error("section [{section}] is missing the {key} key")]
    SectionIncomplete { section: String, key: &'static str },
    #[error("section [{section}] has an invalid {key} value: {value}")]
    InvalidValue {
        section: String,
        key: &'static str,
        value: String,
    },
    #[error("cannot determine the home directory, pass --config explicitly")]
    NoHomeDir,
    #[error("failed to read configuration: {0}")]
    Read(#[from] ini::Error),
    #[error("failed to write configuration: {0}")]
    Write(#[from] std::io::Error),
}

/// 返回配置名对应的分节名。空名视为未命名配置。
pub fn section_name(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{SECTION_PREFIX}-{name}"),
        None => SECTION_PREFIX.to_string(),
    }
}

/// Persisted store of tenant sections, backed by a single INI file.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 使用显式路径，否则回退到 `$HOME/.photobackup`。
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        let home = std::env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::new(PathBuf::from(home).join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Ini, ConfigError> {
        if !self.path.is_file() {
            return Err(ConfigError::Missing(self.path.clone()));
        }
        // 值按原样读取：不去引号，不解释反斜杠转义（Windows 路径）。
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..Default::default()
        };
        Ok(Ini::load_from_file_opt(&self.path, options)?)
    }

    /// Loads and validates the section of the given tenant.
    pub fn load(&self, name: Option<&str>) -> Result<TenantConfig, ConfigError> {
        let ini = self.read()?;
        let section = section_name(name);
        let props = ini
            .section(Some(section.as_str()))
            .ok_or_else(|| ConfigError::SectionMissing(section.clone()))?;

        for key in REQUIRED_KEYS {
            if props.get(key).is_none_or(|value| value.trim().is_empty()) {
                return Err(ConfigError::SectionIncomplete {
                    section: section.clone(),
                    key,
                });
            }
        }

        let required = |key: &'static str| props.get(key).unwrap_or_default().trim().to_string();
        let optional = |key: &'static str| {
            props
                .get(key)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let port_value = required(KEY_PORT);
        let port = port_value
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue {
                section: section.clone(),
                key: KEY_PORT,
                value: port_value.clone(),
            })?;

        Ok(TenantConfig {
            name: name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            media_root: PathBuf::from(required(KEY_MEDIA_ROOT)),
            password_hash: required(KEY_PASSWORD_BCRYPT),
            password_digest: optional(KEY_PASSWORD),
            bind_address: required(KEY_BIND_ADDRESS),
            port,
            path_prefix: optional(KEY_HTTP_PREFIX),
        })
    }

    /// 合并写入一个分节，保留文件中其它配置。
    pub fn save(&self, config: &TenantConfig) -> Result<(), ConfigError> {
        let mut ini = match self.read() {
            Ok(ini) => ini,
            Err(ConfigError::Missing(_)) => Ini::new(),
            Err(err) => return Err(err),
        };

        let section = config.section_name();
        ini.delete(Some(section.as_str()));

        let mut entries = vec![
            (KEY_BIND_ADDRESS, config.bind_address.clone()),
            (KEY_MEDIA_ROOT, config.media_root.to_string_lossy().to_string()),
        ];
        if let Some(digest) = &config.password_digest {
            entries.push((KEY_PASSWORD, digest.clone()));
        }
        entries.push((KEY_PASSWORD_BCRYPT, config.password_hash.clone()));
        entries.push((KEY_PORT, config.port.to_string()));
        if let Some(prefix) = &config.path_prefix {
            entries.push((KEY_HTTP_PREFIX, prefix.clone()));
        }
        for (key, value) in entries {
            ini.set_to(Some(section.as_str()), key.to_string(), value);
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        ini.write_to_file_policy(&self.path, EscapePolicy::Nothing)?;
        Ok(())
    }

    /// Section labels in file order, for display.
    pub fn list_tenant_names(&self) -> Result<Vec<String>, ConfigError> {
        let ini = self.read()?;
        let prefixed = format!("{SECTION_PREFIX}-");
        Ok(ini
            .sections()
            .flatten()
            .filter_map(|section| {
                if section == SECTION_PREFIX {
                    Some(UNNAMED_TENANT_LABEL.to_string())
                } else {
                    section.strip_prefix(prefixed.as_str()).map(str::to_string)
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(name: Option<&str>, root: &str) -> TenantConfig {
        TenantConfig {
            name: name.map(str::to_string),
            media_root: PathBuf::from(root),
            password_hash: "$2b$04$AbCdEfGhIjKlMnOpQrStUuVvWwXxYyZz0123456789abcdefghijk".into(),
            password_digest: Some("DeadBeef".into()),
            bind_address: "127.0.0.1".into(),
            port: 8420,
            path_prefix: None,
        }
    }

    #[test]
    fn section_names_follow_tenant_names() {
        assert_eq!(section_name(None), "photobackup");
        assert_eq!(section_name(Some("")), "photobackup");
        assert_eq!(section_name(Some("alice")), "photobackup-alice");
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = tempdir().expect("tempdir");
        let store = ConfigStore::new(temp.path().join("absent"));
        assert!(matches!(store.load(None), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn save_then_load_keeps_key_case_and_other_sections() {
        let temp = tempdir().expect("tempdir");
        let store = ConfigStore::new(temp.path().join(".photobackup"));

        let default = sample(None, "/data/default");
        let mut alice = sample(Some("alice"), "/data/Alice");
        alice.path_prefix = Some("/backup".into());
        store.save(&default).expect("save default");
        store.save(&alice).expect("save alice");

        let raw = std::fs::read_to_string(store.path()).expect("read raw");
        assert!(raw.contains("PasswordBcrypt"));
        assert!(raw.contains("HTTPPrefix"));

        assert_eq!(store.load(None).expect("load default"), default);
        assert_eq!(store.load(Some("alice")).expect("load alice"), alice);
    }

    #[test]
    fn save_replaces_only_the_target_section() {
        let temp = tempdir().expect("tempdir");
        let store = ConfigStore::new(temp.path().join(".photobackup"));
        store.save(&sample(None, "/old")).expect("save");
        store.save(&sample(Some("bob"), "/bob")).expect("save");

        let mut updated = sample(None, "/new");
        updated.password_digest = None;
        store.save(&updated).expect("resave");

        let loaded = store.load(None).expect("load");
        assert_eq!(loaded.media_root, PathBuf::from("/new"));
        assert_eq!(loaded.password_digest, None);
        assert_eq!(
            store.load(Some("bob")).expect("bob").media_root,
            PathBuf::from("/bob")
        );
    }

    #[test]
    fn load_reports_missing_section() {
        let temp = tempdir().expect("tempdir");
        let store = ConfigStore::new(temp.path().join(".photobackup"));
        store.save(&sample(None, "/data")).expect("save");
        let result = store.load(Some("carol"));
        assert!(matches!(result, Err(ConfigError::SectionMissing(name)) if name == "photobackup-carol"));
    }

    #[test]
    fn load_rejects_incomplete_section() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".photobackup");
        std::fs::write(
            &path,
            "[photobackup]\nBindAddress = 0.0.0.0\nMediaRoot = /data\nPort = 8420\n",
        )
        .expect("write");
        let store = ConfigStore::new(path);
        assert!(matches!(
            store.load(None),
            Err(ConfigError::SectionIncomplete {
                key: "PasswordBcrypt",
                ..
            })
        ));
    }

    #[test]
    fn load_rejects_empty_password_hash() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".photobackup");
        std::fs::write(
            &path,
            "[photobackup]\nBindAddress = 0.0.0.0\nMediaRoot = /data\nPasswordBcrypt =\nPort = 8420\n",
        )
        .expect("write");
        let store = ConfigStore::new(path);
        assert!(matches!(
            store.load(None),
            Err(ConfigError::SectionIncomplete {
                key: "PasswordBcrypt",
                ..
            })
        ));
    }

    #[test]
    fn values_keep_quotes_and_backslashes() {
        let temp = tempdir().expect("tempdir");
        let store = ConfigStore::new(temp.path().join(".photobackup"));
        let quoted = sample(Some("quoted"), "\"/quoted\"");
        let windows = sample(Some("windows"), "C:\\new\\photos #2");
        store.save(&quoted).expect("save quoted");
        store.save(&windows).expect("save windows");

        assert_eq!(store.load(Some("quoted")).expect("load quoted"), quoted);
        assert_eq!(store.load(Some("windows")).expect("load windows"), windows);
    }

    #[test]
    fn load_reads_hand_written_windows_paths_verbatim() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".photobackup");
        std::fs::write(
            &path,
            "[photobackup]\nBindAddress = 0.0.0.0\nMediaRoot = C:\\new\\photos #2\nPasswordBcrypt = x\nPort = 8420\n",
        )
        .expect("write");
        let store = ConfigStore::new(path);
        assert_eq!(
            store.load(None).expect("load").media_root,
            PathBuf::from("C:\\new\\photos #2")
        );
    }

    #[test]
    fn load_rejects_lowercased_keys() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".photobackup");
        std::fs::write(
            &path,
            "[photobackup]\nbindaddress = 0.0.0.0\nmediaroot = /data\npasswordbcrypt = x\nport = 8420\n",
        )
        .expect("write");
        let store = ConfigStore::new(path);
        assert!(matches!(
            store.load(None),
            Err(ConfigError::SectionIncomplete { .. })
        ));
    }

    #[test]
    fn load_rejects_invalid_port() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".photobackup");
        std::fs::write(
            &path,
            "[photobackup]\nBindAddress = 0.0.0.0\nMediaRoot = /data\nPasswordBcrypt = x\nPort = http\n",
        )
        .expect("write");
        let store = ConfigStore::new(path);
        assert!(matches!(
            store.load(None),
            Err(ConfigError::InvalidValue { key: "Port", .. })
        ));
    }

    #[test]
    fn list_maps_section_names_to_labels() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(".photobackup");
        std::fs::write(
            &path,
            "[photobackup]\nPort = 1\n\n[unrelated]\nKey = v\n\n[photobackup-alice]\nPort = 2\n",
        )
        .expect("write");
        let store = ConfigStore::new(path);
        assert_eq!(
            store.list_tenant_names().expect("list"),
            vec!["<unnamed one>".to_string(), "alice".to_string()]
        );
    }
}
