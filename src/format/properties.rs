//! Properties 文本编解码
//!
//! 本地缓存文件和 Properties 格式配置文件共用的 key=value 文本格式

use std::collections::BTreeMap;

/// 属性快照：键唯一，按键排序
pub type Properties = BTreeMap<String, String>;

/// 持久化文件的首行注释
pub const PERSIST_HEADER: &str = "Persisted by DefaultConfig";

/// 解析 properties 文本
///
/// 支持 `#`/`!` 注释、`=`/`:`/空白分隔符、行尾反斜杠续行以及常见转义序列。
/// 重复的键以最后一次出现为准。
pub fn parse(content: &str) -> Properties {
    let mut properties = Properties::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let trimmed = trim_blank_start(line);
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        // 拼接续行
        let mut logical = trimmed.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(trim_blank_start(next)),
                None => break,
            }
        }

        let (key, value) = split_key_value(&logical);
        properties.insert(unescape(key), unescape(value));
    }

    properties
}

/// 将属性快照渲染为 properties 文本
///
/// # 参数
/// * `properties` - 属性快照
/// * `comments` - 写在文件头部的注释行
pub fn render(properties: &Properties, comments: &[&str]) -> String {
    let mut out = String::new();
    for comment in comments {
        out.push('#');
        out.push_str(comment);
        out.push('\n');
    }
    for (key, value) in properties {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

/// 分隔符意义上的空白只有空格、制表符和换页符，其他 Unicode 空白属于内容
fn is_blank(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\u{0c}')
}

fn trim_blank_start(raw: &str) -> &str {
    raw.trim_start_matches(is_blank)
}

/// 奇数个结尾反斜杠表示续行
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => {
                return (&line[..idx], trim_blank_start(&line[idx + 1..]));
            }
            c if is_blank(c) => {
                // 空白之后可能还跟着一个显式分隔符
                let rest = trim_blank_start(&line[idx..]);
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..idx], trim_blank_start(rest));
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{0c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

fn escape(raw: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (idx, ch) in raw.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0c}' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' if is_key || idx == 0 => {
                out.push('\\');
                out.push(ch);
            }
            ' ' if is_key || idx == 0 => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}
