//! Retrieval router: resolves candidate documents, searches their indexes,
//! applies the confidence policy and turns the model reply into a
//! [`RouterResult`].

use std::{sync::Arc, time::Instant};

use ai_llm_service::ChatMessage;
use rag_store::{IndexingStatus, RagStore, SourceDocument};
use tracing::{debug, error, info, instrument, warn};

use crate::api_types::{
    AnswerResponse, AskOptions, FileScore, RouterResult, RouterStatus, RoutingDetail, UsedChunk,
};
use crate::cfg::RouterConfig;
use crate::error::ContextorError;
use crate::llm::ChatModel;
use crate::parse::parse_synthesis;
use crate::prompt::{build_user_prompt, safe_truncate, system_prompt};
use crate::score::{Candidate, ConfidenceTier, aggregate, assemble_context, select_files};

const NO_RELEVANT_ANSWER: &str = "No relevant documents were found for this question.";
const NO_CONTENT_ANSWER: &str = "This document has no searchable content yet.";
const ERROR_ANSWER: &str = "The question could not be answered right now. Please try again later.";

/// Routing decision for one question, before synthesis.
#[derive(Clone, Debug)]
pub struct RoutePlan {
    pub tier: ConfidenceTier,
    /// Selected documents, best first.
    pub selected: Vec<FileScore>,
    pub routing_detail: RoutingDetail,
    pub context: Vec<UsedChunk>,
}

/// Scores candidates, picks authoritative documents and the context to send.
///
/// Returns `None` when there is nothing to route.
pub fn route(candidates: &[Candidate], cfg: &RouterConfig) -> Option<RoutePlan> {
    let leader = candidates.first()?;
    let tier = ConfidenceTier::from_score(leader.score.score, cfg);
    let selected = select_files(candidates, cfg);
    let context = assemble_context(tier, &selected, candidates, cfg);

    Some(RoutePlan {
        tier,
        selected: selected.iter().map(|c| c.score.clone()).collect(),
        routing_detail: RoutingDetail {
            top_file: Some(leader.score.file_name.clone()),
            top_score: leader.score.score,
            file_scores: candidates.iter().map(|c| c.score.clone()).collect(),
        },
        context,
    })
}

/// Builds the final result from a plan and the raw model reply.
///
/// Never fails: a reply without a valid synthesis object becomes the answer
/// verbatim with status `OK`.
pub fn compose(plan: RoutePlan, raw: &str, detailed: bool, cfg: &RouterConfig) -> RouterResult {
    let selected_files = plan.selected.iter().map(|f| f.file_name.clone()).collect();
    let explanation = explain(&plan);

    match parse_synthesis(raw, &plan.context) {
        Ok(s) => {
            let answer = if detailed {
                s.answer
            } else {
                cap_words(&s.answer, cfg.max_words)
            };
            let clarifying_question = match plan.tier {
                ConfidenceTier::High => None,
                ConfidenceTier::Medium => s.clarifying_question,
                ConfidenceTier::Low => s
                    .clarifying_question
                    .or_else(|| Some(default_clarifying(&plan))),
            };
            RouterResult {
                status: plan.tier.status(),
                selected_files,
                answer,
                sources: s.sources,
                confidence_explanation: s.confidence_explanation.unwrap_or(explanation),
                clarifying_question,
                routing_detail: plan.routing_detail,
                raw_used_chunks: plan.context,
            }
        }
        Err(e) => {
            warn!(error = %e, "synthesis reply not structured, returning raw text");
            let clarifying_question =
                (plan.tier == ConfidenceTier::Low).then(|| default_clarifying(&plan));
            RouterResult {
                status: RouterStatus::Ok,
                selected_files,
                answer: raw.to_string(),
                sources: Vec::new(),
                confidence_explanation: format!("{explanation}; reply was returned unstructured"),
                clarifying_question,
                routing_detail: plan.routing_detail,
                raw_used_chunks: plan.context,
            }
        }
    }
}

fn explain(plan: &RoutePlan) -> String {
    let top = plan.routing_detail.top_file.as_deref().unwrap_or("-");
    let mut s = format!(
        "{} confidence: best match {} scored {:.2}",
        plan.tier.as_str(),
        top,
        plan.routing_detail.top_score
    );
    if plan.selected.len() > 1 {
        s.push_str(", runner-up within tie margin also used");
    }
    s
}

fn default_clarifying(plan: &RoutePlan) -> String {
    let names: Vec<&str> = plan
        .routing_detail
        .file_scores
        .iter()
        .take(3)
        .map(|f| f.file_name.as_str())
        .collect();
    format!(
        "None of the documents matched strongly. Which document do you mean, or can you add more detail? Closest matches: {}.",
        names.join(", ")
    )
}

/// Cuts `text` after `max` words, keeping the original spacing of the kept part.
fn cap_words(text: &str, max: usize) -> String {
    let mut words = 0usize;
    let mut in_word = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            words += 1;
            if words > max {
                return format!("{}…", text[..i].trim_end());
            }
        }
    }
    text.to_string()
}

enum Scope {
    /// Indexes to search. `fallback` is the single requested document, used
    /// when its index yields nothing.
    Indexes {
        names: Vec<String>,
        fallback: Option<SourceDocument>,
    },
    FullText(SourceDocument),
    Done(RouterResult),
}

/// Query-time entry point.
#[derive(Clone)]
pub struct Router {
    rag: RagStore,
    chat: Arc<dyn ChatModel>,
    cfg: RouterConfig,
}

impl Router {
    pub fn new(rag: RagStore, chat: Arc<dyn ChatModel>, cfg: RouterConfig) -> Result<Self, ContextorError> {
        cfg.validate()?;
        Ok(Self { rag, chat, cfg })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.cfg
    }

    /// Answers `question` within the scope of `opts`.
    ///
    /// Never fails: provider errors come back as `ERROR` with `success = false`.
    #[instrument(skip(self, question, opts), fields(file_id = ?opts.file_id, collection = ?opts.collection))]
    pub async fn answer(&self, question: &str, opts: AskOptions) -> AnswerResponse {
        let started = Instant::now();
        let result = match self.try_answer(question, &opts).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "question failed");
                RouterResult::bare(RouterStatus::Error, ERROR_ANSWER, e.to_string())
            }
        };
        info!(
            status = %result.status,
            selected = ?result.selected_files,
            latency_ms = started.elapsed().as_millis() as u64,
            "answer ready"
        );
        result.into()
    }

    async fn try_answer(&self, question: &str, opts: &AskOptions) -> Result<RouterResult, ContextorError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(RouterResult::bare(
                RouterStatus::Error,
                "Please ask a question.",
                "empty question",
            ));
        }

        let (names, fallback) = match self.resolve_scope(opts).await? {
            Scope::Indexes { names, fallback } => (names, fallback),
            Scope::FullText(doc) => return self.answer_from_full_text(question, doc, opts.detailed).await,
            Scope::Done(result) => return Ok(result),
        };
        if names.is_empty() {
            debug!("no candidate indexes");
            return Ok(no_relevant());
        }

        let query = self.rag.embeddings().embed_query(question).await?;
        let per_index = match self
            .rag
            .index()
            .search(&query, &names, self.cfg.search_top_k)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "search failed on every index, treating as no results");
                return self.no_hits(question, fallback, opts.detailed).await;
            }
        };

        let candidates = aggregate(per_index);
        let Some(plan) = route(&candidates, &self.cfg) else {
            return self.no_hits(question, fallback, opts.detailed).await;
        };
        debug!(
            tier = plan.tier.as_str(),
            top_score = plan.routing_detail.top_score,
            context = plan.context.len(),
            "routed"
        );

        let raw = self.synthesize(question, &plan, Some(plan.tier), opts.detailed).await?;
        Ok(compose(plan, &raw, opts.detailed, &self.cfg))
    }

    async fn resolve_scope(&self, opts: &AskOptions) -> Result<Scope, ContextorError> {
        let registry = self.rag.registry();
        let index = self.rag.index();

        if let Some(file_id) = opts.file_id.as_deref() {
            let Some(doc) = registry.get(file_id).await? else {
                return Ok(Scope::Done(no_relevant()));
            };
            let has_text = doc
                .extracted_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            // A pending or failed run may have left a partial index behind.
            let name = index.index_name(&doc.file_id, &doc.file_name);
            if doc.indexing_status == IndexingStatus::Indexed && index.index_exists(&name).await? {
                return Ok(Scope::Indexes {
                    names: vec![name],
                    fallback: has_text.then_some(doc),
                });
            }
            if has_text {
                return Ok(Scope::FullText(doc));
            }
            info!(%file_id, "no index and no extracted text");
            return Ok(Scope::Done(RouterResult::bare(
                RouterStatus::NoContent,
                NO_CONTENT_ANSWER,
                "document has neither a vector index nor extracted text",
            )));
        }

        let docs = match opts.collection.as_deref() {
            Some(collection) => {
                let mut docs = Vec::new();
                for id in registry.collection_files(collection).await? {
                    if let Some(doc) = registry.get(&id).await? {
                        docs.push(doc);
                    }
                }
                docs
            }
            None => registry.list().await?,
        };

        let mut names = Vec::with_capacity(docs.len());
        for doc in &docs {
            let name = index.index_name(&doc.file_id, &doc.file_name);
            match index.index_exists(&name).await {
                Ok(true) => names.push(name),
                Ok(false) => debug!(file_id = %doc.file_id, "no index yet, skipped"),
                Err(e) => warn!(file_id = %doc.file_id, error = %e, "index lookup failed, skipped"),
            }
        }
        Ok(Scope::Indexes {
            names,
            fallback: None,
        })
    }

    async fn no_hits(
        &self,
        question: &str,
        fallback: Option<SourceDocument>,
        detailed: bool,
    ) -> Result<RouterResult, ContextorError> {
        match fallback {
            Some(doc) => self.answer_from_full_text(question, doc, detailed).await,
            None => Ok(no_relevant()),
        }
    }

    /// Single-document mode without a usable index: the extracted text is the context.
    async fn answer_from_full_text(
        &self,
        question: &str,
        doc: SourceDocument,
        detailed: bool,
    ) -> Result<RouterResult, ContextorError> {
        info!(file_id = %doc.file_id, status = %doc.indexing_status, "no usable index, answering from full text");
        let text = doc.extracted_text.as_deref().unwrap_or_default();
        let chunk = UsedChunk {
            file_id: doc.file_id.clone(),
            file_name: doc.file_name.clone(),
            chunk_id: 0,
            score: 0.0,
            text: safe_truncate(text.trim(), self.cfg.max_ctx_chars).to_string(),
        };
        let file = FileScore {
            file_id: doc.file_id.clone(),
            file_name: doc.file_name.clone(),
            index_name: String::new(),
            score: 0.0,
            summary: crate::score::excerpt(text, 160),
        };
        let plan = RoutePlan {
            tier: ConfidenceTier::High,
            selected: vec![file.clone()],
            routing_detail: RoutingDetail {
                top_file: Some(file.file_name.clone()),
                top_score: 0.0,
                file_scores: vec![file],
            },
            context: vec![chunk],
        };

        let raw = self.synthesize(question, &plan, None, detailed).await?;
        let mut result = compose(plan, &raw, detailed, &self.cfg);
        result.status = RouterStatus::Ok;
        result.confidence_explanation = format!(
            "{} has no usable vector index; answered from its full extracted text",
            doc.file_name
        );
        Ok(result)
    }

    async fn synthesize(
        &self,
        question: &str,
        plan: &RoutePlan,
        tier: Option<ConfidenceTier>,
        detailed: bool,
    ) -> Result<String, ContextorError> {
        let messages = [
            ChatMessage::system(system_prompt(self.cfg.max_words, detailed)),
            ChatMessage::user(build_user_prompt(
                question,
                tier,
                &plan.selected,
                &plan.context,
                self.cfg.max_ctx_chars,
            )),
        ];
        let reply = self.chat.chat(&messages, None).await;
        if !reply.success {
            return Err(ContextorError::Llm(reply.response));
        }
        if reply.response.trim().is_empty() {
            return Err(ContextorError::Llm("empty reply".into()));
        }
        Ok(reply.response)
    }
}

fn no_relevant() -> RouterResult {
    RouterResult::bare(
        RouterStatus::NoRelevantDocuments,
        NO_RELEVANT_ANSWER,
        "no indexed document matched the question",
    )
}
