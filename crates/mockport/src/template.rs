//! Response body templating.
//!
//! Templates use Jinja syntax and are rendered against the path variables
//! captured by the endpoint's URL pattern.
//!
//! # Supported Template Variables
//!
//! - `{{ <name> }}` - value of the `{<name>}` segment of the URL pattern
//!
//! # Example
//!
//! ```yaml
//! endpoints:
//!   - url: /users/{id}
//!     GET:
//!       template: '{"id": "{{id}}"}'
//! ```
//!
//! A variable that is not bound renders as [`NO_VALUE`] instead of failing
//! the request. Looking up an attribute of an unbound variable
//! (`{{ user.name }}`) is still a render error.

use minijinja::Environment;
use std::collections::HashMap;
use std::fmt;

const TEMPLATE_NAME: &str = "response";

/// Placeholder written in place of an unbound variable
pub const NO_VALUE: &str = "<no value>";

/// Variables captured from the request path, keyed by pattern name
pub type PathVariables = HashMap<String, String>;

/// A parsed template, ready to be rendered once per request
pub struct CompiledTemplate {
    env: Environment<'static>,
    source: String,
}

impl CompiledTemplate {
    /// Parse `source`, failing on syntax errors
    pub fn compile(source: impl Into<String>) -> Result<Self, minijinja::Error> {
        let source = source.into();
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_formatter(|out, state, value| {
            if value.is_undefined() {
                out.write_str(NO_VALUE)?;
                Ok(())
            } else {
                minijinja::escape_formatter(out, state, value)
            }
        });
        env.add_template_owned(TEMPLATE_NAME, source.clone())?;
        Ok(Self { env, source })
    }

    /// Render against the captured path variables
    pub fn render(&self, vars: &PathVariables) -> Result<String, minijinja::Error> {
        self.env.get_template(TEMPLATE_NAME)?.render(vars)
    }

    /// The template text as it was compiled
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("source", &self.source)
            .finish()
    }
}
