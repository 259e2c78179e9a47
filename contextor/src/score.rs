//! Per-file score aggregation, confidence tiers, tie-break selection and
//! context assembly. Everything here is pure.

use std::collections::BTreeMap;

use rag_store::ScoredChunk;

use crate::api_types::{FileScore, RouterStatus, UsedChunk};
use crate::cfg::RouterConfig;

const SUMMARY_CHARS: usize = 160;

/// Tolerance for float noise at the tie margin boundary.
const TIE_EPS: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f32, cfg: &RouterConfig) -> Self {
        if score >= cfg.high {
            ConfidenceTier::High
        } else if score >= cfg.medium {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn status(self) -> RouterStatus {
        match self {
            ConfidenceTier::High => RouterStatus::Ok,
            ConfidenceTier::Medium => RouterStatus::MediumConfidence,
            ConfidenceTier::Low => RouterStatus::LowConfidence,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::Low => "LOW",
        }
    }
}

/// Hits of one candidate document, best first.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub score: FileScore,
    pub hits: Vec<ScoredChunk>,
}

/// Collapses per-index hits into one candidate per index, sorted by best score
/// (descending, ties by file name). Indexes without hits are dropped.
pub fn aggregate(per_index: BTreeMap<String, Vec<ScoredChunk>>) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = per_index
        .into_iter()
        .filter_map(|(index_name, mut hits)| {
            hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then(a.payload.chunk_index.cmp(&b.payload.chunk_index))
            });
            let best = hits.first()?;
            let score = FileScore {
                file_id: best.payload.file_id.clone(),
                file_name: best.payload.file_name.clone(),
                index_name,
                score: best.score,
                summary: excerpt(&best.payload.text, SUMMARY_CHARS),
            };
            Some(Candidate { score, hits })
        })
        .collect();

    out.sort_by(|a, b| {
        b.score
            .score
            .total_cmp(&a.score.score)
            .then_with(|| a.score.file_name.cmp(&b.score.file_name))
    });
    out
}

/// Leader, plus the runner-up when it trails by no more than `tie_margin`.
///
/// `candidates` must be sorted best first (see [`aggregate`]).
pub fn select_files<'a>(candidates: &'a [Candidate], cfg: &RouterConfig) -> Vec<&'a Candidate> {
    let mut picked = Vec::with_capacity(2);
    let Some(leader) = candidates.first() else {
        return picked;
    };
    picked.push(leader);
    if let Some(second) = candidates.get(1) {
        if leader.score.score - second.score.score <= cfg.tie_margin + TIE_EPS {
            picked.push(second);
        }
    }
    picked
}

/// Chunks fed to the model.
///
/// HIGH and MEDIUM take the top `context_per_file` chunks of each selected
/// file. LOW takes the top `low_context_k` chunks across all candidates.
pub fn assemble_context(
    tier: ConfidenceTier,
    selected: &[&Candidate],
    all: &[Candidate],
    cfg: &RouterConfig,
) -> Vec<UsedChunk> {
    let mut used: Vec<UsedChunk> = match tier {
        ConfidenceTier::Low => {
            let mut pool: Vec<&ScoredChunk> = all.iter().flat_map(|c| c.hits.iter()).collect();
            pool.sort_by(|a, b| b.score.total_cmp(&a.score));
            pool.into_iter().take(cfg.low_context_k).map(to_used).collect()
        }
        ConfidenceTier::High | ConfidenceTier::Medium => selected
            .iter()
            .flat_map(|c| c.hits.iter().take(cfg.context_per_file))
            .map(to_used)
            .collect(),
    };
    used.sort_by(|a, b| b.score.total_cmp(&a.score));
    used
}

fn to_used(h: &ScoredChunk) -> UsedChunk {
    UsedChunk {
        file_id: h.payload.file_id.clone(),
        file_name: h.payload.file_name.clone(),
        chunk_id: h.payload.chunk_index,
        score: h.score,
        text: h.payload.text.clone(),
    }
}

/// Whitespace-collapsed prefix of at most `max` characters.
pub fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    flat.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use rag_store::ChunkPayload;

    use super::*;

    fn hit(file: &str, idx: u64, score: f32) -> ScoredChunk {
        ScoredChunk {
            index_name: format!("doc_{file}"),
            score,
            payload: ChunkPayload {
                file_id: file.into(),
                file_name: format!("{file}.txt"),
                file_type: "txt".into(),
                chunk_index: idx,
                text: format!("text {file} {idx}"),
                uploaded_by: None,
                uploaded_at: None,
            },
        }
    }

    fn candidates(scores: &[(&str, f32)]) -> Vec<Candidate> {
        let map = scores
            .iter()
            .map(|(f, s)| (format!("doc_{f}"), vec![hit(f, 0, *s), hit(f, 1, s - 0.1)]))
            .collect();
        aggregate(map)
    }

    #[test]
    fn close_runner_up_is_selected() {
        let cfg = RouterConfig::default();
        let c = candidates(&[("a", 0.80), ("b", 0.78)]);
        let names: Vec<_> = select_files(&c, &cfg)
            .iter()
            .map(|c| c.score.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn distant_runner_up_is_not_selected() {
        let cfg = RouterConfig::default();
        let c = candidates(&[("a", 0.80), ("b", 0.70)]);
        assert_eq!(select_files(&c, &cfg).len(), 1);
    }

    #[test]
    fn exact_margin_counts_as_tie() {
        let cfg = RouterConfig::default();
        let c = candidates(&[("a", 0.75), ("b", 0.72)]);
        assert_eq!(select_files(&c, &cfg).len(), 2);
    }

    #[test]
    fn tiers_follow_thresholds() {
        let cfg = RouterConfig::default();
        assert_eq!(ConfidenceTier::from_score(0.90, &cfg), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.72, &cfg), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.60, &cfg), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.50, &cfg), ConfidenceTier::Low);
    }

    #[test]
    fn empty_hit_lists_are_dropped() {
        let mut map = BTreeMap::new();
        map.insert("doc_x".to_string(), Vec::new());
        map.insert("doc_y".to_string(), vec![hit("y", 0, 0.4)]);
        let c = aggregate(map);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].score.file_id, "y");
    }

    #[test]
    fn low_tier_draws_from_all_candidates() {
        let cfg = RouterConfig {
            low_context_k: 3,
            ..RouterConfig::default()
        };
        let all = candidates(&[("a", 0.50), ("b", 0.45), ("c", 0.30)]);
        let sel = select_files(&all, &cfg);
        let used = assemble_context(ConfidenceTier::Low, &sel, &all, &cfg);
        assert_eq!(used.len(), 3);
        let files: std::collections::BTreeSet<_> = used.iter().map(|u| u.file_id.as_str()).collect();
        assert!(files.contains("b"), "non-leader chunks are used: {used:?}");
    }

    #[test]
    fn selected_files_cap_context_per_file() {
        let cfg = RouterConfig {
            context_per_file: 1,
            ..RouterConfig::default()
        };
        let all = candidates(&[("a", 0.90), ("b", 0.89), ("c", 0.20)]);
        let sel = select_files(&all, &cfg);
        let used = assemble_context(ConfidenceTier::High, &sel, &all, &cfg);
        let labels: Vec<_> = used.iter().map(|u| u.label()).collect();
        assert_eq!(labels, vec!["a.txt#0", "b.txt#0"]);
    }

    #[test]
    fn excerpt_is_char_bounded() {
        let s = "é".repeat(300);
        assert_eq!(excerpt(&s, 200).chars().count(), 200);
        assert_eq!(excerpt("  a \n b ", 10), "a b");
    }
}
