//! Prompt templates: built-in texts, on-disk YAML overrides and `{name}`
//! substitution.
//!
//! A template is a system message plus a user-message prefix containing
//! `{name}` placeholders. `{{` and `}}` produce literal braces. Only the user
//! message is substituted; the system message is sent verbatim.

use nuggetizer_core::{Message, NuggetAssignMode, NuggetMode, NuggetScoreMode, PromptError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Identifies which prompt a stage needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKey {
    Creator(NuggetMode),
    Scorer(NuggetScoreMode),
    Assigner(NuggetAssignMode),
}

impl TemplateKey {
    /// File stem used for YAML overrides.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Creator(NuggetMode::Atomic) => "creator_template",
            Self::Creator(NuggetMode::NounPhrase) => "creator_noun_phrase_template",
            Self::Creator(NuggetMode::Question) => "creator_question_template",
            Self::Scorer(NuggetScoreMode::VitalOkay) => "scorer_template",
            Self::Assigner(NuggetAssignMode::SupportGrade3) => "assigner_template",
            Self::Assigner(NuggetAssignMode::SupportGrade2) => "assigner_2grade_template",
        }
    }
}

/// Named values for placeholder substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVars(BTreeMap<String, String>);

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: impl ToString) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// An unrendered template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub system_message: String,
    pub prefix_user: String,
}

impl Template {
    pub fn render(&self, name: &str, vars: &PromptVars) -> Result<RenderedPrompt, PromptError> {
        Ok(RenderedPrompt {
            system: self.system_message.clone(),
            user: substitute(name, &self.prefix_user, vars)?,
        })
    }
}

/// A template after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl RenderedPrompt {
    pub fn into_messages(self) -> Vec<Message> {
        vec![Message::system(self.system), Message::user(self.user)]
    }
}

/// A source of prompt templates.
pub trait PromptTemplates: Send + Sync {
    fn template(&self, key: TemplateKey) -> Result<Template, PromptError>;

    fn render(&self, key: TemplateKey, vars: &PromptVars) -> Result<RenderedPrompt, PromptError> {
        self.template(key)?.render(key.name(), vars)
    }
}

/// Replace `{name}` placeholders in `text`.
pub fn substitute(template: &str, text: &str, vars: &PromptVars) -> Result<String, PromptError> {
    let invalid = |reason: &str| PromptError::InvalidTemplate {
        name: template.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '{' if chars.next_if(|&(_, n)| n == '{').is_some() => out.push('{'),
            '}' if chars.next_if(|&(_, n)| n == '}').is_some() => out.push('}'),
            '{' => {
                let rest = &text[i + 1..];
                let end = rest
                    .find('}')
                    .ok_or_else(|| invalid("unclosed '{' in template"))?;
                let name = &rest[..end];
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(invalid(&format!("malformed placeholder '{{{name}}}'")));
                }
                let value = vars.get(name).ok_or_else(|| PromptError::UnknownPlaceholder {
                    template: template.to_string(),
                    placeholder: name.to_string(),
                })?;
                out.push_str(value);
                let close = i + 1 + end;
                while chars.next_if(|&(j, _)| j <= close).is_some() {}
            }
            '}' => return Err(invalid("single '}' encountered in template")),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Render strings as a Python list literal, the format models answer in.
pub fn python_list_repr<S: AsRef<str>>(items: &[S]) -> String {
    let inner: Vec<String> = items.iter().map(|s| python_str_repr(s.as_ref())).collect();
    format!("[{}]", inner.join(", "))
}

fn python_str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// --- Built-in texts ---

const CREATOR_SYSTEM: &str = "You are NuggetizeLLM, an intelligent assistant that can update a list of atomic nuggets to best provide all the information required for the query.";

const SCORER_SYSTEM: &str = "You are NuggetizeScoreLLM, an intelligent assistant that can label a list of atomic nuggets based on their importance for a given search query.";

const SCORER_USER: &str = "Based on the query, label each of the {num_nuggets} nuggets either a vital or okay based on the following criteria. Vital nuggets represent concepts that must be present in a \"good\" answer; on the other hand, okay nuggets contribute worthwhile information about the target but are not essential. Return the list of labels in a Pythonic list format (type: List[str]). The list should be in the same order as the input nuggets. Make sure to provide a label for each nugget.\n\nSearch Query: {query}\nNugget List: {nuggets}\n\nOnly return the list of labels (List[str]). Do not explain.\nLabels:";

const ASSIGNER_SYSTEM: &str = "You are NuggetizeAssignerLLM, an intelligent assistant that can label a list of atomic nuggets based on if they are captured by a given passage.";

const ASSIGNER_GRADE3_INSTRUCTION: &str = "Based on the query and passage, label each of the {num_nuggets} nuggets either as support, partial_support, or not_support using the following criteria. A nugget that is fully captured in the passage should be labeled as support. A nugget that is partially captured in the passage should be labeled as partial_support. If the nugget is not captured at all, label it as not_support. Return the list of labels in a Pythonic list format (type: List[str]). The list should be in the same order as the input nuggets. Make sure to provide a label for each nugget.";

const ASSIGNER_GRADE2_INSTRUCTION: &str = "Based on the query and passage, label each of the {num_nuggets} nuggets either as support or not_support using the following criteria. A nugget that is fully captured in the passage should be labeled as support; otherwise, label them as not_support. Return the list of labels in a Pythonic list format (type: List[str]). The list should be in the same order as the input nuggets. Make sure to provide a label for each nugget.";

const ASSIGNER_BODY: &str = "\n\nSearch Query: {query}\nPassage: {context}\nNugget List: {nuggets}\nOnly return the list of labels (List[str]). Do not explain.\nLabels:";

fn creator_user(mode: NuggetMode) -> String {
    let (unit, short, style) = match mode {
        NuggetMode::Atomic => (
            "atomic nuggets of information (1-12 words)",
            "atomic nuggets",
            "Always answer in short nuggets (not questions).",
        ),
        NuggetMode::NounPhrase => (
            "noun-phrase nuggets of information (short noun phrases, 1-8 words)",
            "noun-phrase nuggets",
            "Always answer in short noun phrases (not sentences or questions).",
        ),
        NuggetMode::Question => (
            "nuggets of information phrased as short questions (1-12 words) a good answer must address",
            "question nuggets",
            "Always answer in short questions.",
        ),
    };

    [
        "Update the list of ",
        unit,
        ", if needed, so they best provide the information required for the query. \
         Leverage only the initial list of nuggets (if exists) and the provided context \
         (this is an iterative process). Return only the final list of all nuggets in a \
         Pythonic list format (even if no updates). Make sure there is no redundant \
         information. Ensure the updated nugget list has at most {creator_max_nuggets} \
         nuggets (can be less), keeping only the most vital ones. Order them in decreasing \
         order of importance. Prefer nuggets that provide more interesting information.\n\n\
         Search Query: {query}\nContext:\n{context}\nSearch Query: {query}\n\
         Initial Nugget List: {nuggets}\nInitial Nugget List Length: {nuggets_length}\n\n\
         Only update the list of ",
        short,
        " (if needed, else return as is). Do not explain. ",
        style,
        " List in the form [\"a\", \"b\", ...] and a and b are strings with no mention of \"\n\
         Updated Nugget List:",
    ]
    .concat()
}

/// The templates compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl PromptTemplates for BuiltinTemplates {
    fn template(&self, key: TemplateKey) -> Result<Template, PromptError> {
        Ok(match key {
            TemplateKey::Creator(mode) => Template {
                system_message: CREATOR_SYSTEM.to_string(),
                prefix_user: creator_user(mode),
            },
            TemplateKey::Scorer(NuggetScoreMode::VitalOkay) => Template {
                system_message: SCORER_SYSTEM.to_string(),
                prefix_user: SCORER_USER.to_string(),
            },
            TemplateKey::Assigner(mode) => {
                let instruction = match mode {
                    NuggetAssignMode::SupportGrade3 => ASSIGNER_GRADE3_INSTRUCTION,
                    NuggetAssignMode::SupportGrade2 => ASSIGNER_GRADE2_INSTRUCTION,
                };
                Template {
                    system_message: ASSIGNER_SYSTEM.to_string(),
                    prefix_user: format!("{instruction}{ASSIGNER_BODY}"),
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    system_message: Option<String>,
    #[serde(default)]
    prefix_user: Option<String>,
}

/// Templates loaded from `<dir>/<name>.yaml`, cached after first use.
///
/// A missing file, or a missing key within a file, falls back to the
/// built-in text unless the loader is [`strict`](Self::strict).
#[derive(Debug)]
pub struct YamlTemplates {
    dir: PathBuf,
    strict: bool,
    cache: RwLock<HashMap<TemplateKey, Template>>,
}

impl YamlTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            strict: false,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Require every template to exist on disk with both keys present.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self, key: TemplateKey) -> Result<Template, PromptError> {
        let name = key.name();
        let path = self.dir.join(format!("{name}.yaml"));
        let builtin = BuiltinTemplates.template(key)?;

        if !path.exists() {
            if self.strict {
                return Err(PromptError::TemplateNotFound(path.display().to_string()));
            }
            debug!(template = name, "No template file, using built-in");
            return Ok(builtin);
        }

        let invalid = |reason: String| PromptError::InvalidTemplate {
            name: name.to_string(),
            reason,
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let file: TemplateFile =
            serde_yaml::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

        if self.strict && (file.system_message.is_none() || file.prefix_user.is_none()) {
            return Err(invalid(
                "template must define system_message and prefix_user".into(),
            ));
        }

        debug!(template = name, path = %path.display(), "Loaded template");
        Ok(Template {
            system_message: file.system_message.unwrap_or(builtin.system_message),
            prefix_user: file.prefix_user.unwrap_or(builtin.prefix_user),
        })
    }
}

impl PromptTemplates for YamlTemplates {
    fn template(&self, key: TemplateKey) -> Result<Template, PromptError> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(cached.clone());
        }

        let template = self.load(key)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, template.clone());
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> PromptVars {
        PromptVars::new()
            .set("query", "benefits of X")
            .set("context", "[1] X is great")
            .set("nuggets", python_list_repr(&["a"]))
            .set("nuggets_length", 1)
            .set("creator_max_nuggets", 30)
            .set("num_nuggets", 1)
    }

    #[test]
    fn substitution_replaces_placeholders_and_escapes() {
        let out = substitute("t", "Q: {query} {{literal}}", &vars()).unwrap();
        assert_eq!(out, "Q: benefits of X {literal}");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let err = substitute("scorer_template", "{missing}", &vars()).unwrap_err();
        match err {
            PromptError::UnknownPlaceholder { template, placeholder } => {
                assert_eq!(template, "scorer_template");
                assert_eq!(placeholder, "missing");
            }
            other => panic!("Expected UnknownPlaceholder, got: {other:?}"),
        }
    }

    #[test]
    fn unbalanced_braces_are_invalid() {
        assert!(matches!(
            substitute("t", "open {query", &vars()).unwrap_err(),
            PromptError::InvalidTemplate { .. }
        ));
        assert!(matches!(
            substitute("t", "close } here", &vars()).unwrap_err(),
            PromptError::InvalidTemplate { .. }
        ));
    }

    #[test]
    fn python_repr_matches_python() {
        assert_eq!(python_list_repr::<&str>(&[]), "[]");
        assert_eq!(python_list_repr(&["a", "b"]), "['a', 'b']");
        assert_eq!(python_list_repr(&["it's"]), "[\"it's\"]");
        assert_eq!(python_list_repr(&["both ' and \""]), "['both \\' and \"']");
        assert_eq!(python_list_repr(&["line\nbreak"]), "['line\\nbreak']");
    }

    #[test]
    fn builtin_creator_renders_every_mode() {
        for mode in [NuggetMode::Atomic, NuggetMode::NounPhrase, NuggetMode::Question] {
            let rendered = BuiltinTemplates
                .render(TemplateKey::Creator(mode), &vars())
                .unwrap();
            assert!(rendered.system.starts_with("You are NuggetizeLLM"));
            assert!(rendered.user.contains("Search Query: benefits of X"));
            assert!(rendered.user.contains("at most 30 nuggets"));
            assert!(rendered.user.contains("Initial Nugget List: ['a']"));
            assert!(rendered.user.ends_with("Updated Nugget List:"));
        }
    }

    #[test]
    fn builtin_assigner_varies_by_grade() {
        let grade3 = BuiltinTemplates
            .render(TemplateKey::Assigner(NuggetAssignMode::SupportGrade3), &vars())
            .unwrap();
        let grade2 = BuiltinTemplates
            .render(TemplateKey::Assigner(NuggetAssignMode::SupportGrade2), &vars())
            .unwrap();
        assert!(grade3.user.contains("partial_support"));
        assert!(!grade2.user.contains("partial_support"));
        assert!(grade2.user.contains("Passage: [1] X is great"));
        assert_eq!(grade3.into_messages().len(), 2);
    }

    #[test]
    fn yaml_overrides_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("scorer_template.yaml"),
            "prefix_user: \"Rate {num_nuggets} for {query}\"\n",
        )
        .unwrap();
        let templates = YamlTemplates::new(dir.path());

        let scorer = templates
            .render(TemplateKey::Scorer(NuggetScoreMode::VitalOkay), &vars())
            .unwrap();
        assert_eq!(scorer.user, "Rate 1 for benefits of X");
        assert_eq!(scorer.system, SCORER_SYSTEM);

        let creator = templates
            .template(TemplateKey::Creator(NuggetMode::Atomic))
            .unwrap();
        assert_eq!(creator.system_message, CREATOR_SYSTEM);
    }

    #[test]
    fn yaml_templates_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scorer_template.yaml");
        std::fs::write(&path, "system_message: first\nprefix_user: x\n").unwrap();
        let templates = YamlTemplates::new(dir.path());
        let key = TemplateKey::Scorer(NuggetScoreMode::VitalOkay);

        assert_eq!(templates.template(key).unwrap().system_message, "first");
        std::fs::write(&path, "system_message: second\nprefix_user: x\n").unwrap();
        assert_eq!(templates.template(key).unwrap().system_message, "first");
    }

    #[test]
    fn strict_loader_requires_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = YamlTemplates::new(dir.path())
            .strict()
            .template(TemplateKey::Scorer(NuggetScoreMode::VitalOkay))
            .unwrap_err();
        assert!(matches!(err, PromptError::TemplateNotFound(_)));
    }

    #[test]
    fn malformed_yaml_is_invalid_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("assigner_template.yaml"), "system_message: [unclosed\n").unwrap();
        let err = YamlTemplates::new(dir.path())
            .template(TemplateKey::Assigner(NuggetAssignMode::SupportGrade3))
            .unwrap_err();
        assert!(matches!(err, PromptError::InvalidTemplate { .. }));
    }
}
