// Keyword extraction LLM prompt templates.

pub const KEYWORD_EXTRACTION_SYSTEM: &str = "\
You are a precise resume keyword extractor. \
Identify skills, technologies, tools, certifications and job titles in resume text. \
You MUST respond with valid JSON only. Do NOT use markdown code fences or add explanations.";

pub const KEYWORD_EXTRACTION_PROMPT: &str = r#"Extract keywords from the following resume.

RESUME TEXT:
{resume_text}

KEYWORDS ALREADY ON FILE (do not repeat these):
{existing_keywords}

EXCLUDED TERMS (never return these, in any casing):
{non_keywords}

RULES:
- Each keyword is a short noun phrase (1-4 words): a skill, technology, tool, certification or job title.
- Keep the casing used in the resume (e.g. "PostgreSQL", "Kubernetes").
- Do not return sentences, company names, dates or locations.

OUTPUT SCHEMA (return exactly this structure):
{"keywords": ["string"]}
"#;
