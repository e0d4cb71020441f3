// Defect-risk heuristic: weighted pattern hits over a patch's removed lines.
//
// Stateless and deterministic. Only lines inside hunks that start with `-`
// are scanned; each signal counts at most once per removed line.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Score at or above which a patch is flagged.
pub const DEFAULT_THRESHOLD: i32 = 3;

/// A pattern class detected on a removed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignal {
    /// `if`, `else`, loops, `return`, `break`, ...
    ControlFlow,
    /// `try`, `catch`, `throw`, `except`, `raise`, ...
    ExceptionHandling,
    /// Comparison against `null` / `nil` / `None`.
    NullCheck,
    /// `assert*` calls.
    Assertion,
    /// `TODO`, `FIXME`, `XXX`, `HACK`, "fix later".
    DeveloperWarning,
    /// A line holding only braces and punctuation.
    StructuralBrace,
    /// Logging or print statement.
    Logging,
    /// Something that looks like a function or method signature.
    Signature,
}

impl RiskSignal {
    pub fn weight(self) -> i32 {
        match self {
            Self::ControlFlow
            | Self::ExceptionHandling
            | Self::NullCheck
            | Self::Assertion
            | Self::Signature => 2,
            Self::DeveloperWarning => 3,
            Self::StructuralBrace => 1,
            Self::Logging => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ControlFlow => "control_flow",
            Self::ExceptionHandling => "exception_handling",
            Self::NullCheck => "null_check",
            Self::Assertion => "assertion",
            Self::DeveloperWarning => "developer_warning",
            Self::StructuralBrace => "structural_brace",
            Self::Logging => "logging",
            Self::Signature => "signature",
        }
    }
}

impl std::fmt::Display for RiskSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signal hit, with the 1-based patch line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskHit {
    pub patch_line: usize,
    pub signal: RiskSignal,
}

/// Accumulated score and the hits that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: i32,
    pub hits: Vec<RiskHit>,
}

impl RiskScore {
    pub fn is_likely_defect(&self, threshold: i32) -> bool {
        self.score >= threshold
    }
}

static CONTROL_FLOW: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(if|else|elif|for|foreach|while|do|switch|case|match|return|break|continue|goto|unless)\b")
});

static EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(try|catch|throws?|finally|except|raise|rescue)\b|\bpanic!")
});

static NULL_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)(==|!=)=?\s*(null|nil|none|undefined)\b|\b(null|nil|none|undefined)\s*(==|!=)|\bis\s+(not\s+)?none\b|\.is_(none|some)\(\)",
    )
});

static ASSERTION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(debug_)?assert\w*|\bprecondition\b"));

static DEV_WARNING: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(todo|fixme|xxx|hack)\b|\bfix\s+later\b"));

static BRACE_ONLY: LazyLock<Regex> = LazyLock::new(|| compile(r"^[\s(){}\[\];,]*[{}][\s(){}\[\];,]*$"));

static LOGGING: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(log|logger|logging|console)\s*\.\s*(trace|debug|info|warn|warning|error|fatal|log)\s*\(|\b(e?println|e?print|printf|puts)!?\s*\(|System\.(out|err)\.print|\b(trace|debug|info|warn|error)!\s*\(",
    )
});

static SCRIPT_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^(pub(\([^)]*\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+|^(async\s+)?def\s+\w+\s*\(|^(export\s+)?(async\s+)?function\b|^func\s+",
    )
});

// `<modifiers> <type> <name>(<params>) [{ | throws ...]`
static TYPED_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^((public|private|protected|static|final|abstract|synchronized|virtual|override|inline|internal)\s+)*([\w<>\[\],.?]+)\s+(\w+)\s*\([^;]*\)\s*(\{.*|throws\b.*)?$",
    )
});

/// Tokens that can sit in the type/name slots of [`TYPED_SIGNATURE`] without
/// the line being a declaration.
const NOT_A_DECLARATION: &[&str] = &[
    "if", "else", "for", "while", "switch", "return", "new", "throw", "catch", "case", "do",
    "await", "yield", "match",
];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("risk pattern must compile")
}

fn looks_like_signature(code: &str) -> bool {
    if SCRIPT_SIGNATURE.is_match(code) {
        return true;
    }
    TYPED_SIGNATURE.captures(code).is_some_and(|caps| {
        let ty = caps.get(3).map_or("", |m| m.as_str());
        let name = caps.get(4).map_or("", |m| m.as_str());
        !NOT_A_DECLARATION.contains(&ty) && !NOT_A_DECLARATION.contains(&name)
    })
}

fn classify(code: &str) -> Vec<RiskSignal> {
    let mut signals = Vec::new();
    if CONTROL_FLOW.is_match(code) {
        signals.push(RiskSignal::ControlFlow);
    }
    if EXCEPTION.is_match(code) {
        signals.push(RiskSignal::ExceptionHandling);
    }
    if NULL_CHECK.is_match(code) {
        signals.push(RiskSignal::NullCheck);
    }
    if ASSERTION.is_match(code) {
        signals.push(RiskSignal::Assertion);
    }
    if DEV_WARNING.is_match(code) {
        signals.push(RiskSignal::DeveloperWarning);
    }
    if BRACE_ONLY.is_match(code) {
        signals.push(RiskSignal::StructuralBrace);
    }
    if LOGGING.is_match(code) {
        signals.push(RiskSignal::Logging);
    }
    if looks_like_signature(code) {
        signals.push(RiskSignal::Signature);
    }
    signals
}

/// Score the removed lines of `patch`.
pub fn score_patch(patch: &str) -> RiskScore {
    let mut result = RiskScore::default();
    let mut in_hunk = false;

    for (idx, line) in patch.lines().enumerate() {
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if line.starts_with("diff --git") {
            in_hunk = false;
            continue;
        }
        if !in_hunk {
            continue;
        }
        let Some(removed) = line.strip_prefix('-') else {
            continue;
        };

        for signal in classify(removed.trim()) {
            result.score += signal.weight();
            result.hits.push(RiskHit {
                patch_line: idx + 1,
                signal,
            });
        }
    }

    result
}

/// `true` when the patch scores at or above [`DEFAULT_THRESHOLD`].
pub fn score_defect_risk(patch: &str) -> bool {
    score_patch(patch).is_likely_defect(DEFAULT_THRESHOLD)
}
