// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Template engine adapter.
//!
//! Discoverer configs carry a text template that turns the pulled
//! orchestrator state into master-file zone text. Templates are compiled
//! once at startup (a compile error is a fatal configuration error) and
//! rendered on every pull with the state as the template context.

use serde_json::Value;
use tera::{Context, Tera};

/// A pre-compiled zone template.
pub struct ZoneTemplate {
    tera: Tera,
}

impl std::fmt::Debug for ZoneTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneTemplate").finish_non_exhaustive()
    }
}

/// The internal name under which the single template is registered.
const TEMPLATE_NAME: &str = "zone";

impl ZoneTemplate {
    /// Compile a template from its configuration string.
    pub fn compile(source: &str) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, source)?;
        Ok(ZoneTemplate { tera })
    }

    /// Render the template with the given state as context.
    ///
    /// The state must be a JSON object; its top-level keys become template
    /// variables.
    pub fn render(&self, state: &Value) -> Result<String, tera::Error> {
        let context = Context::from_value(state.clone())?;
        self.tera.render(TEMPLATE_NAME, &context)
    }
}

/// Render a one-off template string with the given context value.
///
/// Used for the owner-flag regex templates in provisioner configs.
pub fn render_str(source: &str, context: &Value) -> Result<String, tera::Error> {
    ZoneTemplate::compile(source)?.render(context)
}
