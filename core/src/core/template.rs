// callflow/src/core/template.rs

//! Argument templates for external tool invocations and the variables they
//! are rendered against.
//!
//! Placeholders are written `{name}`. `{{` and `}}` produce literal braces.
//! List variables (such as the read files of a sample) are only usable through
//! `Arg::Spread` and `Arg::Flagged`, which expand to one argument per item.

use crate::error::{CallflowError, CallflowResult};
use std::collections::HashMap;
use std::path::Path;

/// One entry of a stage's argument template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
  /// A single argument, with `{scalar}` placeholders.
  Text(String),
  /// Expands a list variable into one argument per item.
  Spread(String),
  /// Expands a list variable into `flag item` pairs, e.g. `-V a.g.vcf -V b.g.vcf`.
  Flagged { flag: String, list: String },
}

pub fn arg(text: impl Into<String>) -> Arg {
  Arg::Text(text.into())
}

pub fn spread(list: impl Into<String>) -> Arg {
  Arg::Spread(list.into())
}

pub fn flagged(flag: impl Into<String>, list: impl Into<String>) -> Arg {
  Arg::Flagged {
    flag: flag.into(),
    list: list.into(),
  }
}

/// Builds a `Vec<Arg>` of plain text arguments.
pub fn args<I, S>(items: I) -> Vec<Arg>
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  items.into_iter().map(arg).collect()
}

/// Named values available to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
  scalars: HashMap<String, String>,
  lists: HashMap<String, Vec<String>>,
}

impl TemplateVars {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.scalars.insert(key.into(), value.into());
    self
  }

  pub fn set_list<I, S>(&mut self, key: impl Into<String>, values: I) -> &mut Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.lists.insert(key.into(), values.into_iter().map(Into::into).collect());
    self
  }

  /// Sets `key` to the path and also `key_dir` / `key_name` to its parent
  /// directory and file name.
  pub fn set_path(&mut self, key: &str, path: &Path) -> &mut Self {
    self.set(key, path.display().to_string());
    if let Some(parent) = path.parent() {
      self.set(format!("{key}_dir"), parent.display().to_string());
    }
    if let Some(name) = path.file_name() {
      self.set(format!("{key}_name"), name.to_string_lossy().into_owned());
    }
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.scalars.get(key).map(String::as_str)
  }

  pub fn get_list(&self, key: &str) -> Option<&[String]> {
    self.lists.get(key).map(Vec::as_slice)
  }

  /// Substitutes every `{scalar}` placeholder in `text`.
  pub fn render_text(&self, stage: &str, text: &str) -> CallflowResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
      match ch {
        '{' if matches!(chars.peek(), Some((_, '{'))) => {
          chars.next();
          out.push('{');
        }
        '}' if matches!(chars.peek(), Some((_, '}'))) => {
          chars.next();
          out.push('}');
        }
        '{' => {
          let rest = &text[idx + 1..];
          let Some(end) = rest.find('}') else {
            return Err(unknown(stage, rest));
          };
          let key = &rest[..end];
          let value = self.get(key).ok_or_else(|| unknown(stage, key))?;
          out.push_str(value);
          // Skip the placeholder body and the closing brace.
          for _ in 0..=key.chars().count() {
            chars.next();
          }
        }
        other => out.push(other),
      }
    }
    Ok(out)
  }

  /// Renders a full argument template into the final argument vector.
  pub fn render_args(&self, stage: &str, template: &[Arg]) -> CallflowResult<Vec<String>> {
    let mut rendered = Vec::with_capacity(template.len());
    for item in template {
      match item {
        Arg::Text(text) => rendered.push(self.render_text(stage, text)?),
        Arg::Spread(list) => {
          let values = self.get_list(list).ok_or_else(|| unknown(stage, list))?;
          rendered.extend(values.iter().cloned());
        }
        Arg::Flagged { flag, list } => {
          let values = self.get_list(list).ok_or_else(|| unknown(stage, list))?;
          for value in values {
            rendered.push(flag.clone());
            rendered.push(value.clone());
          }
        }
      }
    }
    Ok(rendered)
  }
}

fn unknown(stage: &str, placeholder: &str) -> CallflowError {
  CallflowError::Template {
    stage: stage.to_string(),
    placeholder: placeholder.to_string(),
  }
}
