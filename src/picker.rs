use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::candidates::Candidate;
use crate::config::PickerConfig;
use crate::error::{DeckError, Result};
use crate::request::BuildRequest;

/// Tolerance for hard-cap share sums.
const CAP_SUM_EPS: f64 = 1e-9;
/// Tolerance for coverage comparisons against the target.
const COVERAGE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetCoverage,
    MaxCards,
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickReport {
    pub picked_count: usize,
    pub achieved_coverage: f64,
    pub pos_counts: HashMap<String, usize>,
    pub stopped_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Hard caps semantics: the sum may stay below 1 (leftover capacity can be
/// filled by any POS without a cap); sums above 1 are ambiguous and rejected.
pub fn validate_caps(max_share_per_pos: &HashMap<String, f64>) -> Result<()> {
    if max_share_per_pos.is_empty() {
        return Ok(());
    }
    let total: f64 = max_share_per_pos.values().map(|v| v.max(0.0)).sum();
    if total > 1.0 + CAP_SUM_EPS {
        return Err(DeckError::Validation(format!(
            "max_share_per_pos sums to {:.3} (> 1). Lower the shares or spread across more POS.",
            total
        )));
    }
    Ok(())
}

/// Convert cap shares to integer limits against the deck budget. Shares are
/// floored, never re-normalized: a small deck can floor a nonzero share to 0.
pub fn caps_to_counts(
    limit: usize,
    max_share_per_pos: &HashMap<String, f64>,
) -> HashMap<String, usize> {
    max_share_per_pos
        .iter()
        .map(|(pos, share)| (pos.clone(), (share.max(0.0) * limit as f64).floor() as usize))
        .collect()
}

/// Soft targets are proportions to aim for; normalize to sum = 1 so the
/// need math stays stable even when the request's sliders sum to ~0.98/1.02.
pub fn normalize_targets(target_share_per_pos: &HashMap<String, f64>) -> HashMap<String, f64> {
    if target_share_per_pos.is_empty() {
        return HashMap::new();
    }
    let total: f64 = target_share_per_pos.values().map(|v| v.max(0.0)).sum();
    if total <= 0.0 {
        return target_share_per_pos.keys().map(|k| (k.clone(), 0.0)).collect();
    }
    target_share_per_pos
        .iter()
        .map(|(pos, v)| (pos.clone(), v.max(0.0) / total))
        .collect()
}

fn head_score(candidate: &Candidate) -> f64 {
    candidate.score.unwrap_or(candidate.cov_share)
}

/// Group candidates by POS, each bucket sorted by score descending.
/// Candidates with no coverage are dropped here.
fn bucketize_by_pos(candidates: Vec<Candidate>) -> HashMap<String, VecDeque<Candidate>> {
    let mut buckets: HashMap<String, Vec<Candidate>> = HashMap::new();
    for candidate in candidates {
        if candidate.cov_share > 0.0 {
            buckets.entry(candidate.pos.clone()).or_default().push(candidate);
        }
    }
    buckets
        .into_iter()
        .map(|(pos, mut bucket)| {
            bucket.sort_by(|a, b| {
                head_score(b)
                    .partial_cmp(&head_score(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            (pos, VecDeque::from(bucket))
        })
        .collect()
}

/// Eligible = bucket non-empty AND under its hard cap (if any).
fn is_eligible(
    pos: &str,
    buckets: &HashMap<String, VecDeque<Candidate>>,
    pos_counts: &HashMap<String, usize>,
    caps: &HashMap<String, usize>,
) -> bool {
    if buckets.get(pos).map_or(true, VecDeque::is_empty) {
        return false;
    }
    match caps.get(pos) {
        Some(cap) => pos_counts.get(pos).copied().unwrap_or(0) < *cap,
        None => true,
    }
}

/// Best available head across eligible buckets, as (pos, head score).
fn global_best_head(
    buckets: &HashMap<String, VecDeque<Candidate>>,
    pos_counts: &HashMap<String, usize>,
    caps: &HashMap<String, usize>,
) -> Option<(String, f64)> {
    let mut best: Option<(String, f64)> = None;
    for (pos, bucket) in buckets {
        if !is_eligible(pos, buckets, pos_counts, caps) {
            continue;
        }
        let score = head_score(&bucket[0]);
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((pos.clone(), score));
        }
    }
    best
}

/// Smoothed need per POS: `need = target_share - (count + α) / (N + α·P)`.
/// Ineligible POS get -inf so they never win the argmax.
fn compute_needs(
    pos_counts: &HashMap<String, usize>,
    targets: &HashMap<String, f64>,
    buckets: &HashMap<String, VecDeque<Candidate>>,
    caps: &HashMap<String, usize>,
    alpha: f64,
) -> HashMap<String, f64> {
    let mut needs = HashMap::new();
    if targets.is_empty() {
        return needs;
    }

    let p = targets.len() as f64;
    let n: usize = pos_counts.values().sum();
    let denom = n as f64 + alpha * p;

    for (pos, target) in targets {
        if !is_eligible(pos, buckets, pos_counts, caps) {
            needs.insert(pos.clone(), f64::NEG_INFINITY);
            continue;
        }
        let s_hat = if denom > 0.0 {
            (pos_counts.get(pos).copied().unwrap_or(0) as f64 + alpha) / denom
        } else {
            1.0 / p
        };
        needs.insert(pos.clone(), target - s_hat);
    }
    needs
}

/// POS-aware greedy picker. Respects hard per-POS caps, steers toward the
/// soft target mix when one is given, and stops at the coverage target or
/// the card-count cap, whichever binds first. Stop conditions are checked
/// at the top of the loop so no pick ever lands past a limit.
pub fn pick_until_target(
    filtered_ranked: Vec<Candidate>,
    req: &BuildRequest,
    cfg: &PickerConfig,
) -> Result<(Vec<Candidate>, PickReport)> {
    if let Some(tc) = req.target_coverage {
        if !(0.0..=1.0).contains(&tc) {
            return Err(DeckError::Validation(
                "target_coverage must be within [0, 1]".to_string(),
            ));
        }
    }

    let limit = match req.max_cards {
        Some(n) if n > 0 => n,
        _ => filtered_ranked.len(),
    };
    validate_caps(&req.max_share_per_pos)?;
    let caps = caps_to_counts(limit, &req.max_share_per_pos);
    let targets = normalize_targets(&req.target_share_per_pos);

    let mut buckets = bucketize_by_pos(filtered_ranked);
    let mut picked: Vec<Candidate> = Vec::new();
    let mut pos_counts: HashMap<String, usize> = HashMap::new();
    let mut coverage = 0.0_f64;
    let reason;

    loop {
        // Stop checks, in order; top-of-loop prevents "one extra pick".
        if let Some(tc) = req.target_coverage {
            if coverage >= tc - COVERAGE_EPS {
                reason = StopReason::TargetCoverage;
                break;
            }
        }
        if picked.len() >= limit {
            reason = StopReason::MaxCards;
            break;
        }
        if buckets.values().all(VecDeque::is_empty) {
            reason = StopReason::Exhausted;
            break;
        }
        if !buckets
            .keys()
            .any(|pos| is_eligible(pos, &buckets, &pos_counts, &caps))
        {
            reason = StopReason::Exhausted;
            break;
        }

        // Seed with the global best on the first iteration.
        if picked.is_empty() {
            let Some((pos, _)) = global_best_head(&buckets, &pos_counts, &caps) else {
                reason = StopReason::Exhausted;
                break;
            };
            let Some(item) = buckets.get_mut(&pos).and_then(VecDeque::pop_front) else {
                reason = StopReason::Exhausted;
                break;
            };
            coverage = (coverage + item.cov_share).min(1.0);
            *pos_counts.entry(pos).or_insert(0) += 1;
            picked.push(item);
            continue;
        }

        // Choose POS: soft need if targets are present, otherwise global best.
        let needs = compute_needs(&pos_counts, &targets, &buckets, &caps, cfg.smoothing_alpha);
        let mut chosen_pos: Option<String> = None;

        if let Some((pos_star, need_star)) = needs
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            if *need_star > cfg.hysteresis_eps
                && is_eligible(pos_star, &buckets, &pos_counts, &caps)
            {
                // Global-utility override: if the global best is much
                // stronger than the needed head, take it instead.
                let needed_score = buckets[pos_star].front().map(head_score);
                let global = global_best_head(&buckets, &pos_counts, &caps);
                chosen_pos = match (global, needed_score) {
                    (Some((g_pos, g_score)), Some(n_score))
                        if g_score >= (1.0 + cfg.score_gap_delta) * n_score =>
                    {
                        Some(g_pos)
                    }
                    _ => Some(pos_star.clone()),
                };
            }
        }

        let chosen_pos = match chosen_pos
            .or_else(|| global_best_head(&buckets, &pos_counts, &caps).map(|(pos, _)| pos))
        {
            Some(pos) => pos,
            None => {
                reason = StopReason::Exhausted;
                break;
            }
        };

        let Some(item) = buckets.get_mut(&chosen_pos).and_then(VecDeque::pop_front) else {
            reason = StopReason::Exhausted;
            break;
        };
        coverage = (coverage + item.cov_share).min(1.0);
        *pos_counts.entry(chosen_pos).or_insert(0) += 1;
        picked.push(item);
    }

    let note = match req.target_coverage {
        Some(tc) if coverage < tc - COVERAGE_EPS => {
            Some("Target not reached with current caps/availability.".to_string())
        }
        _ => None,
    };

    debug!(
        "Picker stopped after {} picks at coverage {:.4} ({:?})",
        picked.len(),
        coverage,
        reason
    );

    let report = PickReport {
        picked_count: picked.len(),
        achieved_coverage: coverage,
        pos_counts,
        stopped_reason: reason,
        note,
    };
    Ok((picked, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::request;

    fn cand(lemma: &str, pos: &str, cov: f64) -> Candidate {
        Candidate {
            lemma: lemma.to_string(),
            pos: pos.to_string(),
            forms: vec![lemma.to_string()],
            freq: 1,
            cov_share: cov,
            score: Some(cov),
            source_form: None,
            source_sentence: None,
            translated_word: None,
            translated_sentence: None,
            source_lang_tag: "sv".to_string(),
            target_lang_tag: "en-GB".to_string(),
        }
    }

    fn cfg() -> PickerConfig {
        PickerConfig {
            hysteresis_eps: 0.02,
            score_gap_delta: 0.15,
            smoothing_alpha: 1.0,
        }
    }

    fn base_request() -> BuildRequest {
        let mut req = request();
        req.target_coverage = None;
        req.max_cards = None;
        req
    }

    #[test]
    fn validate_caps_rejects_sum_above_one() {
        let caps = HashMap::from([("NOUN".to_string(), 0.7), ("VERB".to_string(), 0.4)]);
        assert!(matches!(
            validate_caps(&caps).unwrap_err(),
            DeckError::Validation(_)
        ));
    }

    #[test]
    fn validate_caps_ignores_negative_shares() {
        let caps = HashMap::from([("NOUN".to_string(), -0.5), ("VERB".to_string(), 0.9)]);
        assert!(validate_caps(&caps).is_ok());
    }

    #[test]
    fn caps_floor_against_the_limit() {
        let caps = HashMap::from([("NOUN".to_string(), 0.34)]);
        assert_eq!(caps_to_counts(3, &caps)["NOUN"], 1);
        // Small decks can floor a nonzero share to zero.
        let caps = HashMap::from([("ADJ".to_string(), 0.2)]);
        assert_eq!(caps_to_counts(3, &caps)["ADJ"], 0);
    }

    #[test]
    fn normalize_targets_sums_to_one() {
        let targets = HashMap::from([("NOUN".to_string(), 2.0), ("VERB".to_string(), 2.0)]);
        let normalized = normalize_targets(&targets);
        assert_eq!(normalized["NOUN"], 0.5);
        assert_eq!(normalized["VERB"], 0.5);
        assert!(normalize_targets(&HashMap::new()).is_empty());
    }

    #[test]
    fn normalize_targets_zero_sum_maps_to_all_zero() {
        let targets = HashMap::from([("NOUN".to_string(), 0.0), ("VERB".to_string(), -1.0)]);
        let normalized = normalize_targets(&targets);
        assert_eq!(normalized["NOUN"], 0.0);
        assert_eq!(normalized["VERB"], 0.0);
    }

    #[test]
    fn stops_at_target_coverage() {
        let mut candidates = Vec::new();
        for (i, cov) in [0.12, 0.10, 0.08, 0.06, 0.04].iter().enumerate() {
            candidates.push(cand(&format!("n{}", i), "NOUN", *cov));
        }
        for (i, cov) in [0.16, 0.14, 0.12, 0.10, 0.08].iter().enumerate() {
            candidates.push(cand(&format!("v{}", i), "VERB", *cov));
        }
        let mut req = base_request();
        req.target_coverage = Some(0.8);

        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert_eq!(report.stopped_reason, StopReason::TargetCoverage);
        assert!(report.achieved_coverage >= 0.8);
        assert!(report.achieved_coverage <= 1.0);
        assert_eq!(report.picked_count, picked.len());
        assert!(picked.len() < 10);
        assert!(report.note.is_none());
    }

    #[test]
    fn stops_at_max_cards() {
        let candidates = vec![
            cand("a", "NOUN", 0.3),
            cand("b", "NOUN", 0.2),
            cand("c", "NOUN", 0.1),
        ];
        let mut req = base_request();
        req.max_cards = Some(2);

        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(report.stopped_reason, StopReason::MaxCards);
        assert_eq!(picked[0].lemma, "a");
        assert_eq!(picked[1].lemma, "b");
    }

    #[test]
    fn hard_cap_bounds_pos_counts() {
        let candidates = vec![
            cand("n1", "NOUN", 0.30),
            cand("n2", "NOUN", 0.25),
            cand("v1", "VERB", 0.20),
            cand("v2", "VERB", 0.15),
            cand("v3", "VERB", 0.10),
        ];
        let mut req = base_request();
        req.max_cards = Some(3);
        req.max_share_per_pos = HashMap::from([("NOUN".to_string(), 0.34)]);

        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert_eq!(picked.len(), 3);
        assert_eq!(report.pos_counts["NOUN"], 1);
        assert_eq!(report.pos_counts["VERB"], 2);
        assert_eq!(report.stopped_reason, StopReason::MaxCards);
    }

    #[test]
    fn zero_cap_starves_a_pos_entirely() {
        let candidates = vec![cand("n1", "NOUN", 0.3), cand("n2", "NOUN", 0.2)];
        let mut req = base_request();
        req.max_cards = Some(3);
        req.target_coverage = Some(0.5);
        req.max_share_per_pos = HashMap::from([("NOUN".to_string(), 0.2)]);

        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert!(picked.is_empty());
        assert_eq!(report.stopped_reason, StopReason::Exhausted);
        assert_eq!(
            report.note.as_deref(),
            Some("Target not reached with current caps/availability.")
        );
    }

    #[test]
    fn exhausts_when_candidates_run_out() {
        let candidates = vec![cand("a", "NOUN", 0.1)];
        let (picked, report) = pick_until_target(candidates, &base_request(), &cfg()).unwrap();
        // limit == candidate count, so the empty-buckets check fires first
        // only when a target keeps the loop alive past the last pick.
        assert_eq!(picked.len(), 1);
        assert_eq!(report.stopped_reason, StopReason::MaxCards);

        let candidates = vec![cand("a", "NOUN", 0.1)];
        let mut req = base_request();
        req.target_coverage = Some(0.5);
        req.max_cards = Some(5);
        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(report.stopped_reason, StopReason::Exhausted);
        assert!(report.note.is_some());
    }

    #[test]
    fn zero_coverage_candidates_never_enter_buckets() {
        let candidates = vec![cand("a", "NOUN", 0.0), cand("b", "NOUN", 0.1)];
        let (picked, _) = pick_until_target(candidates, &base_request(), &cfg()).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].lemma, "b");
    }

    #[test]
    fn coverage_accumulates_monotonically_and_clamps_at_one() {
        let candidates = vec![cand("a", "NOUN", 0.9), cand("b", "VERB", 0.8)];
        let mut req = base_request();
        req.target_coverage = Some(1.0);

        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(report.achieved_coverage, 1.0);
        assert_eq!(report.stopped_reason, StopReason::TargetCoverage);
    }

    #[test]
    fn soft_targets_steer_toward_underrepresented_pos() {
        let candidates = vec![
            cand("v1", "VERB", 0.30),
            cand("v2", "VERB", 0.29),
            cand("n1", "NOUN", 0.28),
            cand("n2", "NOUN", 0.27),
        ];
        let mut req = base_request();
        req.max_cards = Some(2);
        req.target_share_per_pos =
            HashMap::from([("NOUN".to_string(), 0.5), ("VERB".to_string(), 0.5)]);

        let (picked, _) = pick_until_target(candidates, &req, &cfg()).unwrap();
        // Seed takes the global best; steering then favors the NOUN head
        // because the verb head is not 15% stronger.
        assert_eq!(picked[0].lemma, "v1");
        assert_eq!(picked[1].lemma, "n1");
    }

    #[test]
    fn score_gap_override_beats_a_marginal_need() {
        let candidates = vec![
            cand("v1", "VERB", 0.30),
            cand("v2", "VERB", 0.29),
            cand("n1", "NOUN", 0.10),
        ];
        let mut req = base_request();
        req.max_cards = Some(2);
        req.target_share_per_pos =
            HashMap::from([("NOUN".to_string(), 0.5), ("VERB".to_string(), 0.5)]);

        let (picked, report) = pick_until_target(candidates, &req, &cfg()).unwrap();
        assert_eq!(picked[1].lemma, "v2");
        assert_eq!(report.pos_counts["VERB"], 2);
    }

    #[test]
    fn balanced_counts_fall_back_to_global_best() {
        let candidates = vec![
            cand("v1", "VERB", 0.30),
            cand("n1", "NOUN", 0.28),
            cand("v2", "VERB", 0.26),
            cand("v3", "VERB", 0.24),
        ];
        let mut req = base_request();
        req.max_cards = Some(3);
        req.target_share_per_pos =
            HashMap::from([("NOUN".to_string(), 0.5), ("VERB".to_string(), 0.5)]);

        let (picked, _) = pick_until_target(candidates, &req, &cfg()).unwrap();
        // After one of each, both needs sit at 0 (below the hysteresis
        // epsilon), so the third pick is the plain global best.
        let lemmas: Vec<&str> = picked.iter().map(|c| c.lemma.as_str()).collect();
        assert_eq!(lemmas, vec!["v1", "n1", "v2"]);
    }

    #[test]
    fn rejects_out_of_range_target_coverage() {
        let mut req = base_request();
        req.target_coverage = Some(1.5);
        let err = pick_until_target(vec![], &req, &cfg()).unwrap_err();
        assert!(matches!(err, DeckError::Validation(_)));
    }
}
