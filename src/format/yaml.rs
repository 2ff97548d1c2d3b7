//! YAML 扁平化
//!
//! 将 YAML 文档转换为扁平的属性快照：嵌套映射以 `.` 连接，序列使用 `[i]` 下标

use crate::error::{ConfigError, Result};
use crate::format::properties::Properties;
use serde_yaml::Value;

/// 将 YAML 文本解析为属性快照
///
/// 空文档得到空快照；根节点必须是映射。
pub fn yaml_to_properties(content: &str) -> Result<Properties> {
    let document: Value = serde_yaml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("YAML解析失败: {}", e)))?;

    let mut properties = Properties::new();
    match document {
        Value::Null => {}
        Value::Mapping(mapping) => {
            for (key, value) in mapping {
                flatten(&scalar_to_string(&key), value, &mut properties);
            }
        }
        other => {
            return Err(ConfigError::ParseError(format!(
                "YAML根节点必须是映射，实际为: {}",
                describe(&other)
            ))
            .into());
        }
    }

    Ok(properties)
}

fn flatten(prefix: &str, value: Value, out: &mut Properties) {
    match value {
        Value::Mapping(mapping) => {
            for (key, child) in mapping {
                let key = format!("{}.{}", prefix, scalar_to_string(&key));
                flatten(&key, child, out);
            }
        }
        Value::Sequence(items) => {
            if items.is_empty() {
                out.insert(prefix.to_string(), String::new());
            }
            for (idx, item) in items.into_iter().enumerate() {
                flatten(&format!("{}[{}]", prefix, idx), item, out);
            }
        }
        Value::Tagged(tagged) => flatten(prefix, tagged.value, out),
        scalar => {
            out.insert(prefix.to_string(), scalar_to_string(&scalar));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        // 复合键极少出现，退化为其 YAML 表示
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_mapping_flattening() {
        let yaml = r#"
server:
  port: 8080
  ssl:
    enabled: true
timeout: 5000
name: demo
"#;
        let props = yaml_to_properties(yaml).unwrap();

        assert_eq!(props.get("server.port"), Some(&"8080".to_string()));
        assert_eq!(props.get("server.ssl.enabled"), Some(&"true".to_string()));
        assert_eq!(props.get("timeout"), Some(&"5000".to_string()));
        assert_eq!(props.get("name"), Some(&"demo".to_string()));
        assert_eq!(props.len(), 4);
    }

    #[test]
    fn test_sequences_and_nulls() {
        let yaml = r#"
hosts:
  - a.example.com
  - b.example.com
users:
  - name: alice
    admin: true
missing:
empty_list: []
"#;
        let props = yaml_to_properties(yaml).unwrap();

        assert_eq!(props.get("hosts[0]"), Some(&"a.example.com".to_string()));
        assert_eq!(props.get("hosts[1]"), Some(&"b.example.com".to_string()));
        assert_eq!(props.get("users[0].name"), Some(&"alice".to_string()));
        assert_eq!(props.get("users[0].admin"), Some(&"true".to_string()));
        assert_eq!(props.get("missing"), Some(&String::new()));
        assert_eq!(props.get("empty_list"), Some(&String::new()));
    }

    #[test]
    fn test_empty_document() {
        assert!(yaml_to_properties("").unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        let result = yaml_to_properties("- a\n- b\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sequence"));

        assert!(yaml_to_properties("key: [unclosed").is_err());
    }
}
