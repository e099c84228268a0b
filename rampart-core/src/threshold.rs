use crate::{Aggregate, MetricSelector, ThresholdParseError};
use std::fmt;
use std::str::FromStr;

/// Which value of an aggregate a threshold compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Count,
    Sum,
    Rate,
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
}

impl Aggregation {
    /// `None` when the aggregate has no value for this aggregation (no samples,
    /// or an aggregation that makes no sense for the metric kind).
    pub fn apply(&self, aggregate: &Aggregate) -> Option<f64> {
        match self {
            Aggregation::Count => Some(aggregate.count()),
            Aggregation::Sum => Some(aggregate.sum()),
            Aggregation::Rate => aggregate.rate(),
            Aggregation::Avg => aggregate.avg(),
            Aggregation::Min => aggregate.min(),
            Aggregation::Med => aggregate.percentile(50.),
            Aggregation::Max => aggregate.max(),
            Aggregation::Percentile(p) => aggregate.percentile(*p),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Count => write!(f, "count"),
            Aggregation::Sum => write!(f, "sum"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "count" => Ok(Aggregation::Count),
            "sum" => Ok(Aggregation::Sum),
            "rate" => Ok(Aggregation::Rate),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "med" => Ok(Aggregation::Med),
            "max" => Ok(Aggregation::Max),
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ThresholdParseError::Aggregation(s.to_string()))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| ThresholdParseError::Percentile(s.to_string()))?;
                if !(0. ..=100.).contains(&p) {
                    return Err(ThresholdParseError::Percentile(s.to_string()));
                }
                Ok(Aggregation::Percentile(p))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// A predicate such as `p(95)<1000` or `rate<0.01`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.aggregation,
            self.comparison.symbol(),
            self.bound
        )
    }
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Two-character operators first so `<=` is not read as `<`.
        const OPERATORS: [(&str, Comparison); 6] = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ];

        let (idx, op, comparison) = OPERATORS
            .iter()
            .filter_map(|(op, cmp)| s.find(op).map(|idx| (idx, *op, *cmp)))
            .min_by_key(|(idx, op, _)| (*idx, usize::MAX - op.len()))
            .ok_or_else(|| ThresholdParseError::MissingOperator(s.to_string()))?;

        let aggregation = s[..idx].parse()?;
        let bound_str = s[idx + op.len()..].trim();
        let bound: f64 = bound_str
            .parse()
            .map_err(|_| ThresholdParseError::Bound(bound_str.to_string()))?;

        Ok(Self {
            aggregation,
            comparison,
            bound,
        })
    }
}

/// One pass/fail rule over an aggregated metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub selector: MetricSelector,
    pub expr: ThresholdExpr,
}

impl ThresholdSpec {
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ThresholdParseError> {
        Ok(Self {
            selector: MetricSelector::parse(metric)?,
            expr: expr.parse()?,
        })
    }
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.selector, self.expr)
    }
}
