use serde::{Deserialize, Serialize};

/// How per-face verdicts in one frame combine into the frame's verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// The last face (in detector order) decides.
    #[default]
    LastWins,
    /// Every face must be lively.
    AllLively,
    /// One lively face is enough.
    AnyLively,
}

impl AggregationPolicy {
    /// `None` when there were no verdicts, meaning the state stays as it was.
    pub fn aggregate<I>(&self, verdicts: I) -> Option<bool>
    where
        I: IntoIterator<Item = bool>,
    {
        let mut iter = verdicts.into_iter();
        let first = iter.next()?;
        Some(match self {
            AggregationPolicy::LastWins => iter.last().unwrap_or(first),
            AggregationPolicy::AllLively => first && iter.all(|v| v),
            AggregationPolicy::AnyLively => first || iter.any(|v| v),
        })
    }
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationPolicy::LastWins => write!(f, "last-wins"),
            AggregationPolicy::AllLively => write!(f, "all-lively"),
            AggregationPolicy::AnyLively => write!(f, "any-lively"),
        }
    }
}

impl std::str::FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-wins" | "last_wins" => Ok(AggregationPolicy::LastWins),
            "all-lively" | "all_lively" => Ok(AggregationPolicy::AllLively),
            "any-lively" | "any_lively" => Ok(AggregationPolicy::AnyLively),
            other => Err(format!(
                "aggregation must be one of: last-wins, all-lively, any-lively, got '{other}'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::last_wins(AggregationPolicy::LastWins)]
    #[case::all(AggregationPolicy::AllLively)]
    #[case::any(AggregationPolicy::AnyLively)]
    fn test_no_verdicts_means_no_update(#[case] policy: AggregationPolicy) {
        assert_eq!(policy.aggregate(std::iter::empty()), None);
    }

    #[rstest]
    #[case::false_then_true(vec![false, true], Some(true))]
    #[case::true_then_false(vec![true, false], Some(false))]
    #[case::single(vec![true], Some(true))]
    #[case::three(vec![true, true, false], Some(false))]
    fn test_last_wins(#[case] verdicts: Vec<bool>, #[case] expected: Option<bool>) {
        assert_eq!(AggregationPolicy::LastWins.aggregate(verdicts), expected);
    }

    #[rstest]
    #[case(vec![true, true], Some(true))]
    #[case(vec![true, false], Some(false))]
    #[case(vec![false, true], Some(false))]
    fn test_all_lively(#[case] verdicts: Vec<bool>, #[case] expected: Option<bool>) {
        assert_eq!(AggregationPolicy::AllLively.aggregate(verdicts), expected);
    }

    #[rstest]
    #[case(vec![false, false], Some(false))]
    #[case(vec![false, true], Some(true))]
    #[case(vec![true, false], Some(true))]
    fn test_any_lively(#[case] verdicts: Vec<bool>, #[case] expected: Option<bool>) {
        assert_eq!(AggregationPolicy::AnyLively.aggregate(verdicts), expected);
    }

    #[test]
    fn test_parse_and_display_agree() {
        for policy in [
            AggregationPolicy::LastWins,
            AggregationPolicy::AllLively,
            AggregationPolicy::AnyLively,
        ] {
            assert_eq!(policy.to_string().parse::<AggregationPolicy>(), Ok(policy));
        }
        assert!("majority".parse::<AggregationPolicy>().is_err());
    }

    #[test]
    fn test_default_is_last_wins() {
        assert_eq!(AggregationPolicy::default(), AggregationPolicy::LastWins);
    }
}
