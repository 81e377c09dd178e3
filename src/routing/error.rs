use std::fmt;

/// 라우팅 규칙 문서의 형식 오류입니다.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    /// 하나의 매치 블록에 경로 조건이 둘 이상 선언됨
    ConflictingPathMatch {
        declared: Vec<&'static str>,
    },
    /// 헤더 조건에 값 조건이 둘 이상 선언됨
    ConflictingHeaderMatch {
        name: String,
        declared: Vec<&'static str>,
    },
    /// 쿼리 조건에 값 조건이 둘 이상 선언됨
    ConflictingQueryMatch {
        name: String,
    },
    /// 헤더/쿼리 이름이 비어 있음
    EmptyName {
        what: &'static str,
    },
    /// prefix와 fullPath 재작성이 동시에 선언됨
    ConflictingRewrite,
    /// 규칙 ID가 비어 있음
    MissingId,
    /// 대상 서비스가 비어 있음
    MissingTargetService {
        rule_id: String,
    },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictingPathMatch { declared } =>
                write!(f, "경로 조건은 하나만 선언할 수 있음: {:?}", declared),
            Self::ConflictingHeaderMatch { name, declared } =>
                write!(f, "헤더 {} 조건은 하나만 선언할 수 있음: {:?}", name, declared),
            Self::ConflictingQueryMatch { name } =>
                write!(f, "쿼리 파라미터 {}에 exact와 regex를 함께 선언할 수 없음", name),
            Self::EmptyName { what } =>
                write!(f, "{} 이름이 비어 있음", what),
            Self::ConflictingRewrite =>
                write!(f, "rewrite.prefix와 rewrite.fullPath는 함께 선언할 수 없음"),
            Self::MissingId =>
                write!(f, "규칙 id가 비어 있음"),
            Self::MissingTargetService { rule_id } =>
                write!(f, "규칙 {}의 targetService가 비어 있음", rule_id),
        }
    }
}

impl std::error::Error for RuleError {}
