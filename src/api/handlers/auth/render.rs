//! Minimal HTML for the login and logout forms.
//!
//! The front-end only needs two self-posting forms, so this stays a string
//! builder instead of pulling in a template engine.

/// A self-posting form with hidden fields carried across the round trip.
pub(crate) struct FormView<'a> {
    pub action: &'a str,
    pub title: &'a str,
    pub submit: &'a str,
    pub error: Option<&'a str>,
    pub hidden: Vec<(&'static str, String)>,
    pub credentials: bool,
}

impl FormView<'_> {
    pub fn render(&self) -> String {
        let mut html = String::with_capacity(1024);
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape(self.title)));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("<h1>{}</h1>\n", escape(self.title)));
        if let Some(error) = self.error {
            html.push_str(&format!(
                "<p class=\"error\" role=\"alert\">{}</p>\n",
                escape(error)
            ));
        }
        html.push_str(&format!(
            "<form method=\"post\" action=\"{}\">\n",
            escape(self.action)
        ));
        for (name, value) in &self.hidden {
            html.push_str(&format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
                escape(name),
                escape(value)
            ));
        }
        if self.credentials {
            html.push_str(
                "<label>Username <input type=\"text\" name=\"username\" autocomplete=\"username\"></label>\n",
            );
            html.push_str(
                "<label>Password <input type=\"password\" name=\"password\" autocomplete=\"current-password\"></label>\n",
            );
            html.push_str(
                "<label><input type=\"checkbox\" name=\"remember\" value=\"on\"> Remember me</label>\n",
            );
        }
        html.push_str(&format!(
            "<button type=\"submit\">{}</button>\n",
            escape(self.submit)
        ));
        html.push_str("</form>\n</body>\n</html>\n");
        html
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> FormView<'static> {
        FormView {
            action: "/login",
            title: "Sign in",
            submit: "Sign in",
            error: None,
            hidden: vec![("state", "abc123".to_string())],
            credentials: true,
        }
    }

    #[test]
    fn renders_hidden_state_and_credential_fields() {
        let html = view().render();
        assert!(html.contains("action=\"/login\""));
        assert!(html.contains("name=\"state\" value=\"abc123\""));
        assert!(html.contains("name=\"username\""));
        assert!(html.contains("name=\"password\""));
        assert!(html.contains("name=\"remember\""));
    }

    #[test]
    fn renders_error_alert() {
        let mut form = view();
        form.error = Some("invalid_grant");
        let html = form.render();
        assert!(html.contains("role=\"alert\""));
        assert!(html.contains("invalid_grant"));
    }

    #[test]
    fn escapes_hidden_values() {
        let mut form = view();
        form.hidden = vec![("state", "\"><script>alert(1)</script>".to_string())];
        let html = form.render();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn confirmation_form_omits_credentials() {
        let mut form = view();
        form.credentials = false;
        let html = form.render();
        assert!(!html.contains("name=\"username\""));
        assert!(!html.contains("name=\"password\""));
    }
}
