//! Prompt templates for BookMind.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub agent: AgentPrompts,
    pub recommendation: RecommendationPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for the conversational agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPrompts {
    pub system: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are BookMind, a friendly and knowledgeable book assistant.

You help readers discover books, answer questions about books and authors, and keep track of what was said earlier in the conversation.

You have tools to query the Open Library catalog:
- Use 'search_catalog' to find books by title, author, or genre before recommending specific editions
- Use 'lookup_cover' to find a cover image for a specific title

Guidelines:
- Prefer real, verifiable books; never invent titles or authors
- When recommending, give the title, the author, and one sentence on why it fits
- If a tool fails, tell the user what you could not look up and answer from your own knowledge
- Keep answers concise"#
                .to_string(),
        }
    }
}

/// Prompts for one-shot structured recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationPrompts {
    pub system: String,
}

impl Default for RecommendationPrompts {
    fn default() -> Self {
        Self {
            system: "You are a helpful and creative book recommendation agent. \
                Provide exactly {{recommendation_count}} distinct book recommendations based on the user's prompt. \
                Include the exact title and author for each book. \
                **DO NOT** include cover URLs. The response must strictly match the given JSON schema."
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let agent_path = custom_path.join("agent.toml");
            if agent_path.exists() {
                let content = std::fs::read_to_string(&agent_path)?;
                prompts.agent = toml::from_str(&content)?;
            }

            let recommendation_path = custom_path.join("recommendation.toml");
            if recommendation_path.exists() {
                let content = std::fs::read_to_string(&recommendation_path)?;
                prompts.recommendation = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }

    /// The agent system instruction with custom variables applied.
    pub fn agent_system(&self) -> String {
        self.render_with_custom(&self.agent.system, &HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.agent.system.contains("search_catalog"));
        assert!(prompts.recommendation.system.contains("{{recommendation_count}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} books.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 books.");
    }

    #[test]
    fn test_provided_vars_override_custom() {
        let mut custom = HashMap::new();
        custom.insert("recommendation_count".to_string(), "5".to_string());
        custom.insert("tone".to_string(), "cheerful".to_string());
        let prompts = Prompts::load(None, Some(&custom)).unwrap();

        let mut vars = HashMap::new();
        vars.insert("recommendation_count".to_string(), "3".to_string());
        let rendered =
            prompts.render_with_custom("{{recommendation_count}} {{tone}} picks", &vars);
        assert_eq!(rendered, "3 cheerful picks");
    }

    #[test]
    fn test_custom_dir_overrides_agent_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agent.toml"),
            "system = \"You only discuss poetry, {{reader}}.\"",
        )
        .unwrap();

        let mut vars = HashMap::new();
        vars.insert("reader".to_string(), "Sam".to_string());
        let prompts = Prompts::load(dir.path().to_str(), Some(&vars)).unwrap();
        assert_eq!(prompts.agent_system(), "You only discuss poetry, Sam.");
        assert!(!prompts.recommendation.system.is_empty());
    }
}
