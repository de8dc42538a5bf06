//! FAQ catalog and menu navigation.
//!
//! The catalog is a static list of categories, each with questions and their answers,
//! loaded once from `catalog.yaml` (or the bundled default). Navigation is a pure lookup:
//! the keyboard button a user pressed is matched against the back button, category names
//! and questions; anything else is free text for the operator relay.

use crate::config::ConfigError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Catalog shipped with the binary; also extracted by `faqrelay init`.
pub const BUNDLED_CATALOG: &str = include_str!("../config/catalog.yaml");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default = "default_greeting")]
    greeting: String,
    #[serde(default = "default_root_prompt")]
    root_prompt: String,
    #[serde(default = "default_category_prompt")]
    category_prompt: String,
    #[serde(default = "default_back_button")]
    back_button: String,
    #[serde(default)]
    categories: Vec<CategoryFile>,
}

#[derive(Debug, Deserialize)]
struct CategoryFile {
    name: String,
    #[serde(default)]
    questions: Vec<QuestionFile>,
}

#[derive(Debug, Deserialize)]
struct QuestionFile {
    question: String,
    answer: String,
}

fn default_greeting() -> String {
    "Вы можете написать вопрос менеджеру или выбрать категорию часто задаваемых вопросов:"
        .to_string()
}

fn default_root_prompt() -> String {
    "Выберите категорию:".to_string()
}

fn default_category_prompt() -> String {
    "Вопросы в категории '{category}':".to_string()
}

fn default_back_button() -> String {
    "⬅️ Назад".to_string()
}

/// Reply keyboard: one button label per cell, rendered top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
}

impl Keyboard {
    /// One button per row, in order.
    pub fn column<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: labels.into_iter().map(|l| vec![l.into()]).collect(),
        }
    }

    /// Labels in display order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }
}

/// Where the user is in the menu after a navigation step. Rebuilt per message, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuState {
    Root,
    CategorySelected(String),
    BackRequested,
}

/// A menu screen: prompt text plus the keyboard to show with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub state: MenuState,
    pub prompt: String,
    pub keyboard: Keyboard,
}

/// Outcome of matching user input against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Menu(Menu),
    Answer(String),
    /// Not a button of the catalog: free-form question for an operator.
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub questions: Vec<String>,
}

/// Validated, read-only FAQ catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    greeting: String,
    root_prompt: String,
    category_prompt: String,
    back_button: String,
    categories: Vec<Category>,
    answers: HashMap<String, String>,
}

impl Catalog {
    /// Parse and validate catalog YAML.
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile =
            serde_yaml::from_str(s).map_err(|e| ConfigError::Catalog(e.to_string()))?;
        Self::from_file(file)
    }

    /// The catalog bundled with the binary.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_yaml(BUNDLED_CATALOG)
    }

    /// Load from `path`; when the file does not exist, fall back to the bundled catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "catalog file not found at {}, using bundled catalog",
                path.display()
            );
            return Ok(Self::bundled()?);
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog from {}", path.display()))?;
        let catalog = Self::from_yaml(&s)
            .with_context(|| format!("loading catalog from {}", path.display()))?;
        Ok(catalog)
    }

    fn from_file(file: CatalogFile) -> Result<Self, ConfigError> {
        let back_button = file.back_button.trim().to_string();
        if back_button.is_empty() {
            return Err(ConfigError::Catalog("backButton is empty".to_string()));
        }
        if file.categories.is_empty() {
            return Err(ConfigError::Catalog("no categories".to_string()));
        }

        let mut category_names = HashSet::new();
        for c in &file.categories {
            let name = c.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Catalog("category with empty name".to_string()));
            }
            if name == back_button {
                return Err(ConfigError::Catalog(format!(
                    "category '{}' collides with the back button",
                    name
                )));
            }
            if !category_names.insert(name.to_string()) {
                return Err(ConfigError::Catalog(format!(
                    "duplicate category '{}'",
                    name
                )));
            }
        }

        let mut categories = Vec::with_capacity(file.categories.len());
        let mut answers: HashMap<String, String> = HashMap::new();
        for c in file.categories {
            let mut questions = Vec::with_capacity(c.questions.len());
            for q in c.questions {
                let question = q.question.trim().to_string();
                if question.is_empty() {
                    return Err(ConfigError::Catalog(format!(
                        "empty question in category '{}'",
                        c.name.trim()
                    )));
                }
                if question == back_button || category_names.contains(&question) {
                    return Err(ConfigError::Catalog(format!(
                        "question '{}' collides with a menu button",
                        question
                    )));
                }
                match answers.get(&question) {
                    Some(existing) if *existing != q.answer => {
                        return Err(ConfigError::Catalog(format!(
                            "question '{}' has conflicting answers",
                            question
                        )));
                    }
                    Some(_) => {}
                    None => {
                        answers.insert(question.clone(), q.answer);
                    }
                }
                questions.push(question);
            }
            categories.push(Category {
                name: c.name.trim().to_string(),
                questions,
            });
        }

        Ok(Self {
            greeting: file.greeting,
            root_prompt: file.root_prompt,
            category_prompt: file.category_prompt,
            back_button,
            categories,
            answers,
        })
    }

    pub fn back_button(&self) -> &str {
        &self.back_button
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn question_count(&self) -> usize {
        self.answers.len()
    }

    fn root_keyboard(&self) -> Keyboard {
        Keyboard::column(self.categories.iter().map(|c| c.name.clone()))
    }

    /// Root category list.
    pub fn root_menu(&self) -> Menu {
        Menu {
            state: MenuState::Root,
            prompt: self.root_prompt.clone(),
            keyboard: self.root_keyboard(),
        }
    }

    /// Greeting shown for /start, with the root keyboard.
    pub fn start_menu(&self) -> Menu {
        Menu {
            state: MenuState::Root,
            prompt: self.greeting.clone(),
            keyboard: self.root_keyboard(),
        }
    }

    /// Match input against the back button, category names and questions, in that order.
    pub fn navigate(&self, input: &str) -> Navigation {
        let input = input.trim();
        if input == self.back_button {
            return Navigation::Menu(Menu {
                state: MenuState::BackRequested,
                prompt: self.root_prompt.clone(),
                keyboard: self.root_keyboard(),
            });
        }
        if let Some(category) = self.categories.iter().find(|c| c.name == input) {
            let mut keyboard = Keyboard::column(category.questions.iter().cloned());
            keyboard.rows.push(vec![self.back_button.clone()]);
            return Navigation::Menu(Menu {
                state: MenuState::CategorySelected(category.name.clone()),
                prompt: self.category_prompt.replace("{category}", &category.name),
                keyboard,
            });
        }
        match self.answers.get(input) {
            Some(answer) => Navigation::Answer(answer.clone()),
            None => Navigation::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::bundled().unwrap()
    }

    fn menu(nav: Navigation) -> Menu {
        match nav {
            Navigation::Menu(m) => m,
            other => panic!("expected menu, got {:?}", other),
        }
    }

    #[test]
    fn bundled_catalog_is_valid() {
        let c = catalog();
        let names: Vec<_> = c.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Общие вопросы", "Второе", "Другое"]);
        assert_eq!(c.question_count(), 10);
        assert_eq!(c.back_button(), "⬅️ Назад");
    }

    #[test]
    fn category_shows_questions_and_back_button() {
        let m = menu(catalog().navigate("Другое"));
        assert_eq!(m.state, MenuState::CategorySelected("Другое".to_string()));
        assert_eq!(m.prompt, "Вопросы в категории 'Другое':");
        let labels: Vec<_> = m.keyboard.labels().collect();
        assert_eq!(labels, vec!["Куда я попал?", "⬅️ Назад"]);
    }

    #[test]
    fn known_question_returns_answer() {
        assert_eq!(
            catalog().navigate("Куда я попал?"),
            Navigation::Answer("Сюда".to_string())
        );
    }

    #[test]
    fn back_returns_to_root_list() {
        let c = catalog();
        let _ = menu(c.navigate("Второе"));
        let back = menu(c.navigate("⬅️ Назад"));
        assert_eq!(back.state, MenuState::BackRequested);
        assert_eq!(back.keyboard, c.root_menu().keyboard);
        assert_eq!(back.prompt, "Выберите категорию:");
        let again = menu(c.navigate("⬅️ Назад"));
        assert_eq!(again, back);
    }

    #[test]
    fn free_text_is_unrecognized() {
        assert_eq!(
            catalog().navigate("When is the next drive?"),
            Navigation::Unrecognized
        );
    }

    #[test]
    fn input_is_trimmed() {
        assert_eq!(
            catalog().navigate("  Куда я попал?\n"),
            Navigation::Answer("Сюда".to_string())
        );
    }

    #[test]
    fn start_menu_uses_greeting() {
        let c = catalog();
        let start = c.start_menu();
        assert!(start.prompt.starts_with("Вас приветствует бот для доноров"));
        assert_eq!(start.keyboard, c.root_menu().keyboard);
    }

    #[test]
    fn rejects_empty_catalog() {
        assert!(matches!(
            Catalog::from_yaml("categories: []"),
            Err(ConfigError::Catalog(_))
        ));
    }

    #[test]
    fn rejects_conflicting_answers() {
        let yaml = r#"
categories:
  - name: A
    questions:
      - { question: "q?", answer: "one" }
  - name: B
    questions:
      - { question: "q?", answer: "two" }
"#;
        assert!(matches!(
            Catalog::from_yaml(yaml),
            Err(ConfigError::Catalog(msg)) if msg.contains("conflicting")
        ));
    }

    #[test]
    fn shared_question_with_same_answer_is_allowed() {
        let yaml = r#"
categories:
  - name: A
    questions:
      - { question: "q?", answer: "same" }
  - name: B
    questions:
      - { question: "q?", answer: "same" }
"#;
        let c = Catalog::from_yaml(yaml).unwrap();
        assert_eq!(c.question_count(), 1);
    }

    #[test]
    fn rejects_question_named_like_category() {
        let yaml = r#"
categories:
  - name: A
    questions:
      - { question: "B", answer: "x" }
  - name: B
"#;
        assert!(Catalog::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_category_named_like_back_button() {
        let yaml = r#"
backButton: "Back"
categories:
  - name: Back
"#;
        assert!(Catalog::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(Catalog::from_yaml("categories: [name").is_err());
    }
}
