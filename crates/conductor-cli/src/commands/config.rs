//! Configuration management commands.

use conductor_core::Config;

use crate::ConfigAction;

pub fn handle(action: ConfigAction, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let mut shown = config.clone();
            shown.llm.api_key = config.llm.resolve_api_key().map(|key| mask(&key));

            println!("Config file: {}", Config::config_dir().join("config.toml").display());
            println!();
            println!("{}", toml::to_string_pretty(&shown)?);

            let validation = config.validate();
            for issue in validation.errors() {
                println!("error   {}: {}", issue.field, issue.message);
            }
            for issue in validation.warnings() {
                println!("warning {}: {}", issue.field, issue.message);
            }
        }
    }
    Ok(())
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_prefix_only() {
        assert_eq!(mask("sk-abcdef123"), "sk-a****");
        assert_eq!(mask("ab"), "ab****");
    }
}
