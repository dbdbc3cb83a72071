//! Rerun index derivation from a generation directory listing.
//!
//! The listing is the only state: no counter is persisted anywhere, so the
//! index for a `(generation, stage)` pair can always be rebuilt from the
//! filenames alone.

use thiserror::Error;

use crate::core::log_name::LogFileName;
use crate::core::stage::Stage;

/// The listing holds an index the next run cannot be numbered past.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rerun index of stage '{stage}' is out of range")]
pub struct IndexOverflow {
    pub stage: Stage,
}

/// Highest recorded rerun index per stage. `None` means the stage has no
/// recorded output yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageHighest([Option<u64>; Stage::COUNT]);

impl StageHighest {
    /// Fails if any recognised name carries an index too large to compare.
    pub fn from_names<I, S>(names: I) -> Result<Self, IndexOverflow>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut highest = [None; Stage::COUNT];
        for name in names {
            let parsed = LogFileName::parse(name.as_ref());
            if let LogFileName::OversizedIndex(stage) = parsed {
                return Err(IndexOverflow { stage });
            }
            if let Some((stage, index)) = parsed.stage_index() {
                let slot = &mut highest[stage.ordinal()];
                *slot = (*slot).max(Some(index));
            }
        }
        Ok(Self(highest))
    }

    pub fn get(&self, stage: Stage) -> Option<u64> {
        self.0[stage.ordinal()]
    }

    /// Split the table around `current` into (earlier, own, later) maxima.
    pub fn partition(&self, current: Stage) -> (Option<u64>, Option<u64>, Option<u64>) {
        let ord = current.ordinal();
        let before = self.0[..ord].iter().copied().max().flatten();
        let after = self.0[ord + 1..].iter().copied().max().flatten();
        (before, self.0[ord], after)
    }
}

/// Inputs and result of one rerun index decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RerunDecision {
    pub before: Option<u64>,
    pub own: Option<u64>,
    pub after: Option<u64>,
    pub index: u64,
}

impl RerunDecision {
    /// Decide the index for `current` given the per-stage maxima.
    ///
    /// Starts from `own + 1`. Catching up to an earlier stage that already
    /// advanced replaces it with `before`; later stages that already advanced
    /// replace it with `after + 1`. Both comparisons are made against `own`
    /// and the later override wins when both hold. Never wraps: an index
    /// that would pass `u64::MAX` is an `IndexOverflow`.
    pub fn decide(highest: &StageHighest, current: Stage) -> Result<Self, IndexOverflow> {
        let (before, own, after) = highest.partition(current);
        let successor = |h: u64| h.checked_add(1).ok_or(IndexOverflow { stage: current });

        let mut index = match own {
            Some(h) => successor(h)?,
            None => 0,
        };
        if let Some(b) = before
            && before > own
        {
            index = b;
        }
        if let Some(a) = after
            && after > own
        {
            index = successor(a)?;
        }

        Ok(Self {
            before,
            own,
            after,
            index,
        })
    }
}

/// Rerun index for `current` given the filenames present in the generation
/// directory.
pub fn next_rerun_index<I, S>(names: I, current: Stage) -> Result<u64, IndexOverflow>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let highest = StageHighest::from_names(names)?;
    Ok(RerunDecision::decide(&highest, current)?.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "123e4567-e89b-12d3-a456-426655440000";

    fn out(stage: &str, index: u64) -> String {
        format!("{stage}.{index}.{ID}.out")
    }

    fn index<I, S>(names: I, current: Stage) -> u64
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        next_rerun_index(names, current).expect("index in range")
    }

    #[test]
    fn empty_listing_starts_at_zero() {
        let names: [&str; 0] = [];
        assert_eq!(index(names, Stage::Setup), 0);
        assert_eq!(index(names, Stage::Apply), 0);
    }

    #[test]
    fn own_reruns_increment() {
        let names = [out("apply", 0), out("apply", 1)];
        assert_eq!(index(&names, Stage::Apply), 2);
    }

    #[test]
    fn later_stage_output_pushes_index_past_it() {
        let names = [out("apply", 0)];
        assert_eq!(index(&names, Stage::Plan), 1);
    }

    #[test]
    fn earlier_stage_output_is_caught_up_to() {
        let names = [out("preapply", 2)];
        assert_eq!(index(&names, Stage::Apply), 2);
    }

    #[test]
    fn legacy_file_counts_as_first_run() {
        assert_eq!(index(["init.out"], Stage::Init), 1);
        assert_eq!(
            index(["init.out"], Stage::Init),
            index([out("init", 0)], Stage::Init)
        );
    }

    #[test]
    fn later_override_wins_when_both_apply() {
        // before=5 and after=1 both exceed own=0; the after rule runs last.
        let names = [out("plan", 5), out("preapply", 0), out("apply", 0), out("postapply", 1)];
        let highest = StageHighest::from_names(&names).expect("names");
        let decision = RerunDecision::decide(&highest, Stage::Apply).expect("decide");
        assert_eq!(decision.before, Some(5));
        assert_eq!(decision.own, Some(0));
        assert_eq!(decision.after, Some(1));
        assert_eq!(decision.index, 2);
    }

    #[test]
    fn equal_neighbours_do_not_override() {
        let names = [out("plan", 3), out("apply", 3), out("postapply", 3)];
        assert_eq!(index(&names, Stage::Apply), 4);
    }

    #[test]
    fn earlier_stage_with_index_zero_catches_up_from_nothing() {
        let names = [out("setup", 0)];
        assert_eq!(index(&names, Stage::PreInit), 0);
    }

    #[test]
    fn unrelated_names_are_ignored() {
        let names = [
            "apply.sh".to_string(),
            "notes.txt".to_string(),
            format!("destroy.7.{ID}.out"),
            out("init", 0),
        ];
        assert_eq!(index(&names, Stage::Init), 1);
    }

    #[test]
    fn highest_index_is_taken_regardless_of_listing_order() {
        let names = [out("plan", 4), out("plan", 9), "plan.out".to_string(), out("plan", 2)];
        let highest = StageHighest::from_names(&names).expect("names");
        assert_eq!(highest.get(Stage::Plan), Some(9));
        assert_eq!(highest.get(Stage::Apply), None);
        assert_eq!(index(&names, Stage::Plan), 10);
    }

    #[test]
    fn full_generation_rerun_of_first_stage() {
        let names: Vec<String> = Stage::ALL.iter().map(|s| out(s.as_str(), 0)).collect();
        assert_eq!(index(&names, Stage::Setup), 1);
        assert_eq!(index(&names, Stage::PostApply), 1);
    }

    #[test]
    fn generation_rerun_catches_up_each_stage() {
        // setup re-ran as index 1; the following stages inherit that index.
        let mut names: Vec<String> = Stage::ALL.iter().map(|s| out(s.as_str(), 0)).collect();
        names.push(out("setup", 1));
        assert_eq!(index(&names, Stage::PreInit), 1);
    }

    #[test]
    fn own_index_at_top_of_range_overflows_instead_of_wrapping() {
        let names = [out("apply", 0), out("apply", u64::MAX)];
        assert_eq!(
            next_rerun_index(&names, Stage::Apply),
            Err(IndexOverflow { stage: Stage::Apply })
        );
    }

    #[test]
    fn later_stage_at_top_of_range_overflows() {
        let names = [out("postapply", u64::MAX)];
        assert_eq!(
            next_rerun_index(&names, Stage::Plan),
            Err(IndexOverflow { stage: Stage::Plan })
        );
    }

    #[test]
    fn earlier_stage_at_top_of_range_is_still_reachable() {
        // Catching up reuses the earlier index itself, so nothing is added.
        let names = [out("setup", u64::MAX)];
        assert_eq!(index(&names, Stage::Init), u64::MAX);
    }

    #[test]
    fn indexes_past_u32_keep_counting() {
        let names = [out("apply", 0), out("apply", 4_294_967_296)];
        assert_eq!(index(&names, Stage::Apply), 4_294_967_297);
    }

    #[test]
    fn index_too_large_for_u64_is_an_error() {
        let names = [out("apply", 0), format!("apply.18446744073709551616.{ID}.out")];
        assert_eq!(
            next_rerun_index(&names, Stage::Apply),
            Err(IndexOverflow { stage: Stage::Apply })
        );
    }
}
