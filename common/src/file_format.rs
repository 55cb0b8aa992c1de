use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML deserialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON deserialization failed")]
    Json(#[from] serde_json::Error),
}

pub type FormatResult<T> = Result<T, FormatError>;

pub fn get_file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> FormatResult<Self> {
        let ext = get_file_extension(path).ok_or(FormatError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FormatError::UnsupportedFileExtension(
                path.display().to_string(),
            ))
        }
    }
}

pub fn deserialize<T: DeserializeOwned>(serialized: &str, format: FileFormat) -> FormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads `path` and deserializes it with the format implied by its extension.
pub fn load_from_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> FormatResult<T> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| FormatError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    deserialize(&text, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        values: Vec<u32>,
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            FileFormat::from_path(Path::new("config.yaml")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("dir/config.YML")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("config.json")).unwrap(),
            FileFormat::Json
        );
    }

    #[test]
    fn format_rejects_unknown_or_missing_extension() {
        assert!(matches!(
            FileFormat::from_path(Path::new("config")),
            Err(FormatError::MissingFileExtension)
        ));
        assert!(matches!(
            FileFormat::from_path(Path::new("config.toml")),
            Err(FormatError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn deserialize_yaml_and_json_agree() {
        let yaml: Sample = deserialize("name: a\nvalues: [1, 2]\n", FileFormat::Yaml).unwrap();
        let json: Sample =
            deserialize(r#"{"name": "a", "values": [1, 2]}"#, FileFormat::Json).unwrap();
        assert_eq!(yaml, json);
        assert_eq!(yaml.values, vec![1, 2]);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = load_from_file::<Sample>("/nonexistent/dir/config.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dir/config.json"));
    }
}
