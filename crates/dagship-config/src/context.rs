//! Authentication contexts.
//!
//! The global config file holds one `context` node per platform domain and
//! names the active one:
//!
//! ```kdl
//! current-context "cloud.example.io"
//!
//! context "cloud.example.io" {
//!     token "eyJhbGciOi..."
//!     workspace "cl0abc123"
//!     organization "org-42"
//!     system-admin #false
//! }
//! ```

use crate::nodes::{bool_node, first_bool_arg, first_string_arg, string_node};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the config directory.
pub const HOME_ENV: &str = "DAGSHIP_HOME";

const CONFIG_DIR: &str = ".dagship";
const CONFIG_FILE: &str = "config.kdl";

/// Credentials and defaults for one platform domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Platform domain, e.g. `cloud.example.io`.
    pub domain: String,
    /// Bearer token. Empty when logged out.
    pub token: String,
    /// Default workspace for commands that need one.
    pub workspace: String,
    /// Organization the workspace belongs to.
    pub organization: String,
    /// System admins see internal runtime releases.
    pub system_admin: bool,
}

impl Context {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Contents of the global config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    pub current_context: Option<String>,
    pub contexts: Vec<Context>,
}

impl GlobalConfig {
    /// Parse the global config from KDL text.
    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;

        let mut config = Self::default();
        for node in doc.nodes() {
            match node.name().value() {
                "current-context" => {
                    config.current_context = first_string_arg(node);
                }
                "context" => {
                    let context = parse_context(node)?;
                    if config.contexts.iter().any(|c| c.domain == context.domain) {
                        return Err(ConfigError::Duplicate(format!(
                            "context '{}'",
                            context.domain
                        )));
                    }
                    config.contexts.push(context);
                }
                _ => {} // Ignore unknown nodes
            }
        }

        if let Some(current) = &config.current_context {
            if !config.contexts.iter().any(|c| &c.domain == current) {
                return Err(ConfigError::InvalidValue {
                    field: "current-context".to_string(),
                    message: format!("no context named '{}'", current),
                });
            }
        }

        Ok(config)
    }

    /// Load from a file. A missing file is an empty config.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write to a file, creating the parent directory. The file holds tokens,
    /// so on unix it is readable by the owner only.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_kdl()).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }

        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Render as KDL text.
    pub fn to_kdl(&self) -> String {
        let mut doc = KdlDocument::new();

        if let Some(current) = &self.current_context {
            doc.nodes_mut().push(string_node("current-context", current));
        }

        for context in &self.contexts {
            let mut node = string_node("context", &context.domain);
            let mut children = KdlDocument::new();
            children.nodes_mut().push(string_node("token", &context.token));
            children
                .nodes_mut()
                .push(string_node("workspace", &context.workspace));
            children
                .nodes_mut()
                .push(string_node("organization", &context.organization));
            children
                .nodes_mut()
                .push(bool_node("system-admin", context.system_admin));
            node.set_children(children);
            doc.nodes_mut().push(node);
        }

        doc.autoformat();
        doc.to_string()
    }

    /// The active context, if one is selected.
    pub fn current(&self) -> Option<&Context> {
        let current = self.current_context.as_deref()?;
        self.contexts.iter().find(|c| c.domain == current)
    }

    pub fn current_mut(&mut self) -> Option<&mut Context> {
        let current = self.current_context.clone()?;
        self.contexts.iter_mut().find(|c| c.domain == current)
    }

    /// Insert or replace the context for its domain and make it current.
    pub fn set_current(&mut self, context: Context) {
        self.current_context = Some(context.domain.clone());
        match self.contexts.iter_mut().find(|c| c.domain == context.domain) {
            Some(existing) => *existing = context,
            None => self.contexts.push(context),
        }
    }
}

fn parse_context(node: &KdlNode) -> ConfigResult<Context> {
    let domain = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("context domain".to_string()))?;

    let mut context = Context::new(domain);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "token" => context.token = first_string_arg(child).unwrap_or_default(),
                "workspace" => context.workspace = first_string_arg(child).unwrap_or_default(),
                "organization" => {
                    context.organization = first_string_arg(child).unwrap_or_default()
                }
                "system-admin" => {
                    context.system_admin =
                        first_bool_arg(child).ok_or_else(|| ConfigError::InvalidValue {
                            field: "system-admin".to_string(),
                            message: "expected #true or #false".to_string(),
                        })?;
                }
                _ => {}
            }
        }
    }

    Ok(context)
}

/// Directory holding the global config: `$DAGSHIP_HOME`, else `~/.dagship`.
pub fn config_home() -> ConfigResult<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

/// Path of the global config file.
pub fn global_config_path() -> ConfigResult<PathBuf> {
    Ok(config_home()?.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        current-context "cloud.example.io"

        context "cloud.example.io" {
            token "secret-token"
            workspace "ws-1"
            organization "org-1"
            system-admin #true
        }

        context "staging.example.io" {
            workspace "ws-staging"
        }
    "#;

    #[test]
    fn test_parse_contexts() {
        let config = GlobalConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.contexts.len(), 2);

        let current = config.current().unwrap();
        assert_eq!(current.domain, "cloud.example.io");
        assert_eq!(current.token, "secret-token");
        assert_eq!(current.workspace, "ws-1");
        assert_eq!(current.organization, "org-1");
        assert!(current.system_admin);
        assert!(current.is_authenticated());

        let staging = &config.contexts[1];
        assert!(!staging.is_authenticated());
        assert!(!staging.system_admin);
    }

    #[test]
    fn test_no_current_context() {
        let config = GlobalConfig::parse(r#"context "cloud.example.io""#).unwrap();
        assert!(config.current().is_none());
    }

    #[test]
    fn test_current_context_must_exist() {
        let result = GlobalConfig::parse(r#"current-context "nowhere.io""#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_duplicate_context() {
        let kdl = r#"
            context "cloud.example.io"
            context "cloud.example.io"
        "#;
        assert!(matches!(
            GlobalConfig::parse(kdl),
            Err(ConfigError::Duplicate(_))
        ));
    }

    #[test]
    fn test_context_requires_domain() {
        assert!(matches!(
            GlobalConfig::parse("context"),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_kdl_round_trip() {
        let config = GlobalConfig::parse(SAMPLE).unwrap();
        let reparsed = GlobalConfig::parse(&config.to_kdl()).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_set_current_replaces_existing() {
        let mut config = GlobalConfig::parse(SAMPLE).unwrap();
        let mut ctx = Context::new("staging.example.io");
        ctx.token = "new-token".to_string();
        config.set_current(ctx);

        assert_eq!(config.contexts.len(), 2);
        let current = config.current().unwrap();
        assert_eq!(current.domain, "staging.example.io");
        assert_eq!(current.token, "new-token");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = GlobalConfig::load(&dir.path().join("config.kdl")).unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.kdl");

        let mut config = GlobalConfig::default();
        let mut ctx = Context::new("cloud.example.io");
        ctx.token = "t".to_string();
        ctx.workspace = "ws".to_string();
        config.set_current(ctx);
        config.save(&path).unwrap();

        let loaded = GlobalConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
