// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Instruction that keeps extracted terms anchored to the source text.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only return terms that literally appear in the provided resume text \
    or are an unambiguous short form of such a term. \
    Do NOT infer, interpolate, or invent skills the text does not mention.";
