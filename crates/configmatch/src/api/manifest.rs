//! Multi-document YAML manifests for ConfigMatch, ConfigMap and Secret objects.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::resource::{ConfigMatch, DataObject, ObjectMeta, Payload, ResourceKind, SourceKind};
use crate::error::ManifestError;

/// A single object parsed from a manifest document.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    ConfigMatch(ConfigMatch),
    Object(DataObject),
}

impl Manifest {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Manifest::ConfigMatch(_) => ResourceKind::ConfigMatch,
            Manifest::Object(obj) => obj.kind.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Manifest::ConfigMatch(m) => m.name(),
            Manifest::Object(obj) => &obj.metadata.name,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestHeader {
    api_version: String,
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfigMap {
    metadata: ObjectMeta,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
    #[serde(default)]
    binary_data: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSecret {
    metadata: ObjectMeta,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
    #[serde(default)]
    string_data: Option<BTreeMap<String, String>>,
}

/// Parses every document in a `---`-separated YAML stream.
///
/// Empty documents are skipped. Secret `data` and ConfigMap `binaryData`
/// values are base64, as in Kubernetes.
pub fn parse_manifests(content: &str) -> Result<Vec<Manifest>, ManifestError> {
    let mut manifests = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| ManifestError::parse(index, e))?;
        if value.is_null() {
            continue;
        }
        manifests.push(parse_document(index, value)?);
    }

    Ok(manifests)
}

fn parse_document(index: usize, value: serde_yaml::Value) -> Result<Manifest, ManifestError> {
    let header: ManifestHeader =
        serde_yaml::from_value(value.clone()).map_err(|e| ManifestError::parse(index, e))?;

    let kind: ResourceKind = header
        .kind
        .parse()
        .map_err(|_| ManifestError::UnknownKind(header.kind.clone()))?;

    let expected = kind.api_version();
    if header.api_version != expected {
        return Err(ManifestError::InvalidApiVersion {
            version: header.api_version,
            expected: expected.to_string(),
        });
    }

    match kind {
        ResourceKind::ConfigMatch => {
            let resource: ConfigMatch =
                serde_yaml::from_value(value).map_err(|e| ManifestError::parse(index, e))?;
            Ok(Manifest::ConfigMatch(resource))
        }
        ResourceKind::ConfigMap => {
            let raw: RawConfigMap =
                serde_yaml::from_value(value).map_err(|e| ManifestError::parse(index, e))?;
            let mut payload = raw.data.map(|data| {
                data.into_iter()
                    .map(|(k, v)| (k, v.into_bytes()))
                    .collect::<Payload>()
            });
            if let Some(binary) = raw.binary_data {
                let decoded = decode_values(&raw.metadata.name, binary)?;
                payload.get_or_insert_with(Payload::new).extend(decoded);
            }
            Ok(Manifest::Object(DataObject {
                kind: SourceKind::ConfigMap,
                metadata: raw.metadata,
                data: payload,
            }))
        }
        ResourceKind::Secret => {
            let raw: RawSecret =
                serde_yaml::from_value(value).map_err(|e| ManifestError::parse(index, e))?;
            let mut payload = match raw.data {
                Some(data) => Some(decode_values(&raw.metadata.name, data)?),
                None => None,
            };
            // stringData overrides data, like the API server's merge.
            if let Some(string_data) = raw.string_data {
                payload
                    .get_or_insert_with(Payload::new)
                    .extend(string_data.into_iter().map(|(k, v)| (k, v.into_bytes())));
            }
            Ok(Manifest::Object(DataObject {
                kind: SourceKind::Secret,
                metadata: raw.metadata,
                data: payload,
            }))
        }
    }
}

fn decode_values(name: &str, values: BTreeMap<String, String>) -> Result<Payload, ManifestError> {
    values
        .into_iter()
        .map(|(key, encoded)| match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => Ok((key, bytes)),
            Err(e) => Err(ManifestError::InvalidBase64 {
                name: name.to_string(),
                key,
                message: e.to_string(),
            }),
        })
        .collect()
}
