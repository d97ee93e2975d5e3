// Resume keyword engine: extraction, reconciliation and manual curation of a
// resume's keyword and non-keyword lists.
// All LLM calls go through llm_client via the extraction module.

pub mod blob;
pub mod editor;
pub mod extraction;
pub mod handlers;
pub mod ingest;
pub mod normalizer;
pub mod pg_store;
pub mod prompts;
pub mod reconciler;
pub mod retry;
pub mod state_machine;
pub mod store;

#[cfg(test)]
pub mod testing;
