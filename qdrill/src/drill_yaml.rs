use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// On-disk drill settings. Every field is optional; unset fields fall through to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DrillYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumers: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub wait_time: Option<YamlDuration>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visibility_timeout: Option<YamlDuration>,

    /// spread | drop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remainder: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receive_timeout: Option<YamlDuration>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shutdown_grace: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_send: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_receive: Option<bool>,

    /// Relative paths resolve against the YAML file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 20s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub(crate) async fn load_drill_yaml(path: &Path) -> anyhow::Result<DrillYaml> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read drill YAML: {}", path.display()))?;

    let mut doc: DrillYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    if let Some(body) = doc.body_file.take() {
        doc.body_file = Some(match path.parent() {
            Some(dir) if body.is_relative() => dir.join(body),
            _ => body,
        });
    }

    Ok(doc)
}

pub(crate) async fn write_yaml_file<T: Serialize>(path: &Path, doc: &T) -> anyhow::Result<()> {
    let s = serde_yaml::to_string(doc).context("failed to serialize YAML")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, s)
        .await
        .with_context(|| format!("failed to write file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_strings_and_numbers() -> anyhow::Result<()> {
        let doc: DrillYaml = serde_yaml::from_str(
            "waitTime: 5s\nvisibilityTimeout: 30\nreceiveTimeout: 1.5\nshutdownGrace: 250ms\n",
        )?;
        assert_eq!(
            doc.wait_time.map(YamlDuration::into_inner),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            doc.visibility_timeout.map(YamlDuration::into_inner),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            doc.receive_timeout.map(YamlDuration::into_inner),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            doc.shutdown_grace.map(YamlDuration::into_inner),
            Some(Duration::from_millis(250))
        );
        Ok(())
    }

    #[test]
    fn out_of_range_float_duration_is_an_error() {
        let parsed: Result<DrillYaml, _> = serde_yaml::from_str("waitTime: 1.0e30\n");
        let err = match parsed {
            Ok(doc) => panic!("expected an error, got {doc:?}"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("Duration"), "unexpected error: {err}");

        let parsed: Result<DrillYaml, _> = serde_yaml::from_str("waitTime: -1.5\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<DrillYaml, _> = serde_yaml::from_str("totl: 10\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn serializes_only_set_fields() -> anyhow::Result<()> {
        let doc = DrillYaml {
            total: Some(10),
            wait_time: Some(Duration::from_secs(20).into()),
            ..DrillYaml::default()
        };
        let s = serde_yaml::to_string(&doc)?;
        assert_eq!(s, "total: 10\nwaitTime: 20s\n");
        Ok(())
    }

    #[tokio::test]
    async fn relative_body_file_resolves_next_to_the_yaml() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("drill.yaml");
        tokio::fs::write(&path, "bodyFile: payload.json\nqueue: jobs\n").await?;

        let doc = load_drill_yaml(&path).await?;
        assert_eq!(doc.body_file, Some(dir.path().join("payload.json")));
        assert_eq!(doc.queue.as_deref(), Some("jobs"));
        Ok(())
    }
}
