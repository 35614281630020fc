//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{ForgeError, ForgeResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> ForgeResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;
            ui::step_ok(&UiContext::detect(), &format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> ForgeResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> ForgeResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn(
            &ctx,
            &format!(
                "Config already exists at {} - use --force to overwrite",
                path.display()
            ),
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(
        &ctx,
        &format!("Configuration initialized ({})", path.display()),
    );
    Ok(())
}

/// Apply a dot-separated key to `config`
fn set_value(config: &mut Config, key: &str, value: &str) -> ForgeResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => return Err(invalid(key, "expected text or json")),
        },
        ["general", "audit_log"] => config.general.audit_log = parse_bool(key, value)?,

        ["workspace", "project_root"] => config.workspace.project_root = PathBuf::from(value),
        ["workspace", "apps_dir"] => config.workspace.apps_dir = PathBuf::from(value),
        ["workspace", "temp_root"] => config.workspace.temp_root = optional_path(value),

        ["toolchain", "program"] => config.toolchain.program = value.to_string(),
        ["toolchain", "args"] => {
            config.toolchain.args = value.split_whitespace().map(String::from).collect()
        }
        ["toolchain", "timeout_secs"] => {
            config.toolchain.timeout_secs = if value.is_empty() {
                None
            } else {
                Some(
                    value
                        .parse()
                        .map_err(|_| invalid(key, "expected a number of seconds"))?,
                )
            }
        }

        ["cache", "enabled"] => config.cache.enabled = parse_bool(key, value)?,
        ["cache", "dir"] => config.cache.dir = optional_path(value),

        ["registry", "path"] => config.registry.path = optional_path(value),

        ["package", "compress"] => config.package.compress = parse_bool(key, value)?,
        ["package", "include"] => {
            config.package.include = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }

        _ => {
            return Err(ForgeError::ConfigInvalid {
                path: PathBuf::from(key),
                reason: "unknown configuration key".to_string(),
            })
        }
    }

    Ok(())
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn parse_bool(key: &str, value: &str) -> ForgeResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, "expected true or false")),
    }
}

fn invalid(key: &str, reason: &str) -> ForgeError {
    ForgeError::ConfigInvalid {
        path: PathBuf::from(key),
        reason: reason.to_string(),
    }
}
