// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the template adapter.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::template::{render_str, ZoneTemplate};
    use crate::zonefile::parse_zone_data;

    #[test]
    fn test_render_zone_from_state() {
        let template = ZoneTemplate::compile(
            "{% for name, app in applications %}{{ app.host }}. 10 IN A {{ app.ip }}\n{% endfor %}",
        )
        .expect("template compiles");

        let state = json!({
            "applications": {
                "/web": {"host": "web.example.com", "ip": "10.0.0.1"},
                "/api": {"host": "api.example.com", "ip": "10.0.0.2"},
            }
        });

        let text = template.render(&state).expect("template renders");
        let zone = parse_zone_data(&text).expect("rendered zone parses");
        assert_eq!(zone.len(), 2);

        let names: Vec<&str> = zone.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"web.example.com."));
        assert!(names.contains(&"api.example.com."));
    }

    #[test]
    fn test_compile_error() {
        assert!(ZoneTemplate::compile("{% for x in %}").is_err());
    }

    #[test]
    fn test_render_error_surfaces() {
        let template = ZoneTemplate::compile("{{ missing.field }}").expect("template compiles");
        assert!(template.render(&json!({})).is_err());
    }

    #[test]
    fn test_render_str_with_context() {
        let rendered = render_str("host-{{ env.POD }}", &json!({"env": {"POD": "web-1"}}))
            .expect("template renders");
        assert_eq!(rendered, "host-web-1");
    }
}
