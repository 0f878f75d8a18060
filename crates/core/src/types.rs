//! 도메인 타입 -- 워크플로우 전역에서 사용되는 공통 타입
//!
//! 프로비저닝 변수, 출력 집합, 리소스 조회 결과, 검증 결과를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 프로비저닝 변수 값
///
/// 문자열은 `-var key=value` 형태로 그대로 전달되고,
/// 그 외의 값은 HCL 리터럴로 렌더링됩니다 ([`VarValue::to_hcl`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    /// 불리언
    Bool(bool),
    /// 정수
    Integer(i64),
    /// 실수
    Float(f64),
    /// 문자열
    String(String),
    /// 리스트
    List(Vec<VarValue>),
    /// 맵 (키 순서 고정)
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 모든 실수 값(중첩 포함)이 유한한지 확인합니다. NaN과 무한대는 HCL로 표현할 수 없습니다.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Map(entries) => entries.values().all(Self::is_finite),
            Self::Bool(_) | Self::Integer(_) | Self::String(_) => true,
        }
    }

    /// `-var` 인자에 들어갈 값 표현을 반환합니다.
    ///
    /// 최상위 문자열은 따옴표 없이 그대로, 나머지는 HCL 리터럴로 변환합니다.
    pub fn to_cli_value(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_hcl(),
        }
    }

    /// HCL 리터럴 표현을 반환합니다.
    pub fn to_hcl(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => quote_hcl(s),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_hcl).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{} = {}", quote_hcl(k), v.to_hcl()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

fn quote_hcl(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// apply 성공 후 수집된 출력 집합
///
/// 출력 이름 → 문자열 값. 문자열이 아닌 출력은 compact JSON으로 저장됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSet {
    values: BTreeMap<String, String>,
}

impl OutputSet {
    /// 빈 출력 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 출력을 추가합니다.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// 이름으로 출력을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// 출력 이름 목록
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// (이름, 값) 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for OutputSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// 태그 조회로 찾은 클라우드 리소스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// 리소스 식별자 (예: `i-0abc123`)
    pub id: String,
    /// 프로바이더 수명주기 상태 (예: `running`)
    pub state: String,
    /// 리소스 태그
    pub tags: BTreeMap<String, String>,
}

impl fmt::Display for ResourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.state)
    }
}

/// 단일 검증(assertion)의 결과
///
/// 영속화되지 않으며 워크플로우 리포트에만 포함됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// 검증 이름 (예: `output.vscode_server_instance_id`)
    pub name: String,
    /// 통과 여부
    pub passed: bool,
    /// 실패 사유 또는 관측 값
    pub detail: String,
}

impl VerificationResult {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{mark}] {}: {}", self.name, self.detail)
    }
}
