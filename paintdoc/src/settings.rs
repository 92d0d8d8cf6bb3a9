const DOCUMENTATION: &str = r#"# Paintdoc settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing fields take their default values.

# [document]
# create_layer_if_empty = true
# thumbnail_size = 256
# jpeg_quality = 90
# history_limit = 500

"#;

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(serde::Serialize, serde::Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub document: paintdoc_core::document::DocumentOptions,
    pub export: ExportSettings,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExportSettings {
    /// Keep transparency when exporting flat PNGs.
    pub png_alpha: bool,
}
impl Default for ExportSettings {
    fn default() -> Self {
        Self { png_alpha: true }
    }
}

impl Settings {
    const FILENAME: &'static str = "settings.toml";
    /// Settings from the user's preferences, or defaults if unavailable for some reason.
    #[must_use]
    pub fn load_or_default() -> Self {
        let Some(mut path) = preferences_dir() else {
            log::warn!("No preferences dir found, using default settings.");
            return Self::default();
        };
        path.push(Self::FILENAME);
        let settings: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(&path)?;
            let settings: Self = toml::from_str(&string)?;
            Ok(settings)
        };
        match settings {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings at {path:?} weren't available, defaulting: {e}");
                Self::default()
            }
        }
    }
    /// Write these settings to the user's preferences, returning where they went.
    pub fn save(&self) -> anyhow::Result<std::path::PathBuf> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(self)?;
        std::fs::write(&preferences, string)?;
        Ok(preferences)
    }
}
