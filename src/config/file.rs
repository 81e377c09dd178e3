use std::collections::HashMap;
use std::path::Path;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, error};

use super::document::ConfigDocument;
use super::error::StoreError;

/// 메시 설정 파일의 내장 JSON 스키마
///
/// 로더가 읽는 필드의 최소 형태만 확인합니다. 세부 의미 검증은
/// 각 컴포넌트가 적재 시점에 수행합니다.
const MESH_CONFIG_SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "type": "object",
    "properties": {
        "global": {
            "type": "object",
            "properties": {
                "defaultTimeoutMs": {"type": "integer", "minimum": 0},
                "defaultRetries": {"type": "integer", "minimum": 0},
                "routingRules": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "action"],
                        "properties": {
                            "id": {"type": "string"},
                            "priority": {"type": "integer"},
                            "matches": {"type": "array", "items": {"type": "object"}},
                            "action": {
                                "type": "object",
                                "required": ["targetService"],
                                "properties": {
                                    "targetService": {"type": "string"},
                                    "targetPort": {"type": "integer", "minimum": 1, "maximum": 65535},
                                    "retryPolicy": {"type": "string"}
                                }
                            }
                        }
                    }
                },
                "retryPolicies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "maxAttempts", "backoffStrategy", "initialIntervalMs"],
                        "properties": {
                            "id": {"type": "string"},
                            "maxAttempts": {"type": "integer", "minimum": 1},
                            "backoffStrategy": {
                                "type": "string",
                                "enum": ["FIXED", "EXPONENTIAL", "RANDOM_JITTER"]
                            },
                            "initialIntervalMs": {"type": "integer", "minimum": 0},
                            "maxIntervalMs": {"type": "integer", "minimum": 0},
                            "multiplier": {"type": "number", "exclusiveMinimum": 0},
                            "retryOnHttpStatusCodes": {"type": "array", "items": {"type": "integer"}},
                            "retryOnGrpcStatusCodes": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                },
                "securityPolicies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "action"],
                        "properties": {
                            "id": {"type": "string"},
                            "action": {"type": "string", "enum": ["ALLOW", "DENY"]},
                            "source": {"type": "object"},
                            "destination": {"type": "object"}
                        }
                    }
                }
            }
        },
        "services": {
            "type": "object",
            "additionalProperties": {
                "type": "object",
                "properties": {
                    "timeoutMs": {"type": "integer", "minimum": 0},
                    "retries": {"type": "integer", "minimum": 0},
                    "loadBalancer": {"type": "string"}
                }
            }
        }
    }
}"#;

/// 설정 파일에서 읽어 들인 전역/서비스 설정
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshConfigFile {
    pub global: ConfigDocument,
    pub services: HashMap<String, ConfigDocument>,
}

/// 메시 설정 파일 검증기
pub struct MeshConfigValidator {
    schema: JSONSchema,
}

impl MeshConfigValidator {
    pub fn new() -> Result<Self, StoreError> {
        let schema_value: Value = serde_json::from_str(MESH_CONFIG_SCHEMA)
            .map_err(|e| StoreError::SchemaCompileError {
                reason: format!("스키마 파싱 오류: {}", e),
            })?;

        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| StoreError::SchemaCompileError {
                reason: e.to_string(),
            })?;

        Ok(Self { schema })
    }

    /// 스키마 위반 목록을 `경로: 메시지` 형태로 돌려줍니다.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        match self.schema.validate(value) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_string() } else { path };
                    format!("{}: {}", path, e)
                })
                .collect()),
        }
    }
}

/// 문자열로 된 설정 파일 내용을 검증하고 분리합니다.
///
/// `origin`은 에러 메시지에 표시할 파일 경로입니다.
pub fn parse_str(content: &str, origin: &str) -> Result<MeshConfigFile, StoreError> {
    let value: Value = serde_json::from_str(content).map_err(|e| StoreError::ParseError {
        path: origin.to_string(),
        source: e,
    })?;

    let validator = MeshConfigValidator::new()?;
    if let Err(errors) = validator.validate(&value) {
        error!(path = %origin, errors = ?errors, "설정 파일 스키마 검증 실패");
        return Err(StoreError::SchemaError {
            path: origin.to_string(),
            errors,
        });
    }

    let mut root = ConfigDocument::try_from(value)?;
    let global = match root.remove("global") {
        Some(value) => ConfigDocument::try_from(value)?,
        None => ConfigDocument::new(),
    };

    let mut services = HashMap::new();
    if let Some(Value::Object(entries)) = root.remove("services") {
        for (service_id, value) in entries {
            services.insert(service_id, ConfigDocument::try_from(value)?);
        }
    }

    debug!(
        path = %origin,
        global_keys = global.len(),
        services = services.len(),
        "설정 파일 파싱 완료"
    );
    Ok(MeshConfigFile { global, services })
}

pub async fn load_file<P: AsRef<Path>>(path: P) -> Result<MeshConfigFile, StoreError> {
    let origin = path.as_ref().to_string_lossy().to_string();
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| StoreError::FileError {
            path: origin.clone(),
            error: e,
        })?;
    parse_str(&content, &origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_and_services() {
        let content = r#"{
            "global": {
                "defaultTimeoutMs": 3000,
                "retryPolicies": [
                    {"id": "default", "maxAttempts": 3, "backoffStrategy": "FIXED", "initialIntervalMs": 100}
                ]
            },
            "services": {
                "serviceA": {"timeoutMs": 500, "loadBalancer": "ROUND_ROBIN"}
            }
        }"#;

        let parsed = parse_str(content, "mesh.json").unwrap();
        assert_eq!(parsed.global.get_u64("defaultTimeoutMs"), Some(3000));
        assert_eq!(parsed.services["serviceA"].get_str("loadBalancer"), Some("ROUND_ROBIN"));
    }

    #[test]
    fn test_schema_violation_reports_path() {
        let content = r#"{
            "global": {
                "retryPolicies": [
                    {"id": "bad", "maxAttempts": 0, "backoffStrategy": "FIXED", "initialIntervalMs": 100}
                ]
            }
        }"#;

        match parse_str(content, "mesh.json") {
            Err(StoreError::SchemaError { errors, .. }) => {
                assert!(errors.iter().any(|e| e.contains("/global/retryPolicies/0/maxAttempts")));
            }
            other => panic!("스키마 에러를 기대했지만 {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backoff_strategy_rejected() {
        let content = r#"{
            "global": {
                "retryPolicies": [
                    {"id": "bad", "maxAttempts": 2, "backoffStrategy": "LINEAR", "initialIntervalMs": 100}
                ]
            }
        }"#;
        assert!(matches!(parse_str(content, "mesh.json"), Err(StoreError::SchemaError { .. })));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            parse_str("{ not json", "mesh.json"),
            Err(StoreError::ParseError { .. })
        ));
    }

    #[test]
    fn test_empty_object_is_valid() {
        let parsed = parse_str("{}", "mesh.json").unwrap();
        assert!(parsed.global.is_empty());
        assert!(parsed.services.is_empty());
    }
}
