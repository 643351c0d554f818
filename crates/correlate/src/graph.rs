use std::collections::HashMap;

use traceloom_core::error::TraceIssue;
use traceloom_core::model::span::{SpanKind, SpanRecord};

/// Per-trace execution tree reconstructed from flat span records.
///
/// Parent/child relations are index vectors into the sorted span list, so
/// cycle detection and concurrent read access never chase pointers. Spans
/// are held in start-time order (`span_id` tiebreak), which is also the
/// execution flow.
#[derive(Debug, Clone)]
pub struct TraceTree {
    pub trace_id: String,
    pub spans: Vec<SpanRecord>,
    pub root: Option<usize>,
    pub parent: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
    pub issues: Vec<TraceIssue>,
}

impl TraceTree {
    pub fn build(trace_id: &str, mut spans: Vec<SpanRecord>) -> Self {
        spans.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.span_id.cmp(&b.span_id))
        });

        let index = spans
            .iter()
            .enumerate()
            .map(|(i, s)| (s.span_id.clone(), i))
            .collect::<HashMap<_, _>>();

        let mut issues = Vec::new();
        let mut parent = vec![None; spans.len()];
        for (i, span) in spans.iter().enumerate() {
            if span.is_root() {
                continue;
            }
            let parent_id = span.parent_span_id.as_deref().unwrap_or_default();
            match index.get(parent_id) {
                Some(&p) => parent[i] = Some(p),
                None => {
                    // The orphan still anchors a subtree; it joins the root
                    // candidates so its descendants stay reachable.
                    issues.push(TraceIssue::MissingParent {
                        span_id: span.span_id.clone(),
                        parent_span_id: parent_id.to_string(),
                    });
                }
            }
        }

        let roots = parent
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.is_none().then_some(i))
            .collect::<Vec<_>>();

        let root = match roots.as_slice() {
            [] => {
                issues.push(TraceIssue::MissingRoot);
                None
            }
            [single] => Some(*single),
            many => {
                issues.push(TraceIssue::MultipleRoots {
                    span_ids: many.iter().map(|&i| spans[i].span_id.clone()).collect(),
                });
                None
            }
        };

        for i in 0..spans.len() {
            let mut cursor = parent[i];
            let mut steps = 0;
            while let Some(p) = cursor {
                if p == i {
                    issues.push(TraceIssue::Cycle {
                        span_id: spans[i].span_id.clone(),
                    });
                    break;
                }
                steps += 1;
                if steps > spans.len() {
                    break;
                }
                cursor = parent[p];
            }
        }

        let mut children = vec![Vec::new(); spans.len()];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = *p {
                children[p].push(i);
            }
        }

        Self {
            trace_id: trace_id.to_string(),
            spans,
            root,
            parent,
            children,
            issues,
        }
    }

    /// A complete trace has exactly one root, no cycles and no dangling
    /// parent references; anything else is excluded from strict rollups.
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn root_span(&self) -> Option<&SpanRecord> {
        self.root.map(|i| &self.spans[i])
    }

    /// What ran and in what order: span kinds by ascending start time.
    pub fn execution_flow(&self) -> Vec<SpanKind> {
        self.spans.iter().map(|s| s.kind.clone()).collect()
    }

    /// The trace's secondary correlation key, resolved from the root span.
    pub fn correlation_key(&self) -> Option<String> {
        self.root_span().and_then(|s| s.attrs.correlation_key())
    }
}
