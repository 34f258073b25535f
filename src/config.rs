use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// File extensions recognized as workspace documents
    pub file_extensions: Vec<String>,
    pub heading_completions: bool,
    pub unresolved_diagnostics: bool,
    pub references_in_codeblocks: bool,
    /// Append the first recognized extension when completing extensionless paths
    pub include_extension_in_completion: bool,
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/mdrefs/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.mdrefs",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("file_extensions", vec!["md".to_string()])?
            .set_default("heading_completions", true)?
            .set_default("unresolved_diagnostics", true)?
            .set_default("references_in_codeblocks", false)?
            .set_default("include_extension_in_completion", true)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            file_extensions: vec!["md".to_string()],
            heading_completions: true,
            unresolved_diagnostics: true,
            references_in_codeblocks: false,
            include_extension_in_completion: true,
        }
    }
}
