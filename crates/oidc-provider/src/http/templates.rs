//! Server-rendered pages of the interactive authorization flow.

const STYLES: &str = r#"
* { box-sizing: border-box; margin: 0; padding: 0; }
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f5f7;
    color: #1f2328;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
    line-height: 1.5;
}
.card {
    background: #fff;
    border: 1px solid #d0d7de;
    border-radius: 8px;
    padding: 2rem;
    width: 100%;
    max-width: 380px;
}
h1 { font-size: 1.25rem; margin-bottom: 1rem; }
label { display: block; font-size: 0.875rem; margin-bottom: 0.25rem; }
input[type=text], input[type=password] {
    width: 100%;
    padding: 0.5rem;
    border: 1px solid #d0d7de;
    border-radius: 6px;
    margin-bottom: 1rem;
}
button {
    padding: 0.5rem 1rem;
    border-radius: 6px;
    border: 1px solid transparent;
    cursor: pointer;
    font-size: 0.875rem;
}
.primary { background: #1f6feb; color: #fff; }
.secondary { background: #fff; border-color: #d0d7de; }
.actions { display: flex; gap: 0.5rem; justify-content: flex-end; }
.error { background: #ffebe9; border: 1px solid #ff8182; border-radius: 6px; padding: 0.5rem; margin-bottom: 1rem; }
.muted { color: #656d76; font-size: 0.875rem; }
ul.scopes { list-style: none; margin: 1rem 0; }
ul.scopes li { padding: 0.25rem 0; border-bottom: 1px solid #eaeef2; }
code { font-size: 0.8rem; }
"#;

fn page(title: &str, body: &str) -> String {
    let mut html = String::with_capacity(STYLES.len() + body.len() + 256);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>");
    html.push_str(&html_escape(title));
    html.push_str("</title>\n<style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n<div class=\"card\">\n");
    html.push_str(body);
    html.push_str("\n</div>\n</body>\n</html>\n");
    html
}

/// Login form. Posts `action=login`, `flow_id`, `username`, `password`.
pub fn render_login_form(client_name: &str, flow_id: &str, error: Option<&str>) -> String {
    let mut body = String::with_capacity(1024);
    body.push_str("<h1>Sign in to ");
    body.push_str(&html_escape(client_name));
    body.push_str("</h1>\n");

    if let Some(error) = error {
        body.push_str("<div class=\"error\">");
        body.push_str(&html_escape(error));
        body.push_str("</div>\n");
    }

    body.push_str("<form method=\"POST\">\n");
    push_hidden(&mut body, "flow_id", flow_id);
    body.push_str("<label for=\"username\">Username</label>\n");
    body.push_str("<input type=\"text\" id=\"username\" name=\"username\" required autocomplete=\"username\">\n");
    body.push_str("<label for=\"password\">Password</label>\n");
    body.push_str("<input type=\"password\" id=\"password\" name=\"password\" required autocomplete=\"current-password\">\n");
    body.push_str("<div class=\"actions\">\n");
    body.push_str("<button type=\"submit\" name=\"action\" value=\"deny\" class=\"secondary\" formnovalidate>Cancel</button>\n");
    body.push_str("<button type=\"submit\" name=\"action\" value=\"login\" class=\"primary\">Sign in</button>\n");
    body.push_str("</div>\n</form>");

    page("Sign in", &body)
}

/// Consent form. Posts `action=approve|deny` and `flow_id`.
pub fn render_consent_form(client_name: &str, redirect_uri: &str, scopes: &[&str], flow_id: &str) -> String {
    let mut body = String::with_capacity(1024);
    body.push_str("<h1>");
    body.push_str(&html_escape(client_name));
    body.push_str(" wants to access your account</h1>\n");
    body.push_str("<p class=\"muted\">You will be returned to <code>");
    body.push_str(&html_escape(redirect_uri));
    body.push_str("</code></p>\n");

    if scopes.is_empty() {
        body.push_str("<p class=\"muted\">No additional permissions are requested.</p>\n");
    } else {
        body.push_str("<ul class=\"scopes\">\n");
        for scope in scopes {
            body.push_str("<li>");
            body.push_str(&html_escape(scope_description(scope)));
            body.push_str(" <code>");
            body.push_str(&html_escape(scope));
            body.push_str("</code></li>\n");
        }
        body.push_str("</ul>\n");
    }

    body.push_str("<form method=\"POST\">\n");
    push_hidden(&mut body, "flow_id", flow_id);
    body.push_str("<div class=\"actions\">\n");
    body.push_str("<button type=\"submit\" name=\"action\" value=\"deny\" class=\"secondary\">Deny</button>\n");
    body.push_str("<button type=\"submit\" name=\"action\" value=\"approve\" class=\"primary\">Allow</button>\n");
    body.push_str("</div>\n</form>");

    page("Authorize", &body)
}

/// Error page for requests that cannot be redirected back to the client.
pub fn render_error_page(error_code: &str, error_description: &str) -> String {
    let mut body = String::with_capacity(512);
    body.push_str("<h1>Authorization error</h1>\n<div class=\"error\">");
    body.push_str(&html_escape(error_description));
    body.push_str("</div>\n<p class=\"muted\"><code>");
    body.push_str(&html_escape(error_code));
    body.push_str("</code></p>");

    page("Error", &body)
}

/// Confirmation shown after the login session ended.
pub fn render_signed_out_page() -> String {
    page("Signed out", "<h1>Signed out</h1>\n<p class=\"muted\">You can close this window.</p>")
}

fn scope_description(scope: &str) -> &str {
    match scope {
        "openid" => "Confirm your identity",
        "profile" => "See your name and username",
        "email" => "See your email address",
        "offline_access" => "Keep access while you are away",
        other => other,
    }
}

fn push_hidden(out: &mut String, name: &str, value: &str) {
    out.push_str("<input type=\"hidden\" name=\"");
    out.push_str(name);
    out.push_str("\" value=\"");
    out.push_str(&html_escape(value));
    out.push_str("\">\n");
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_form_carries_flow_id_and_error() {
        let html = render_login_form("Demo", "flow-123", Some("Invalid username or password"));
        assert!(html.contains("name=\"flow_id\" value=\"flow-123\""));
        assert!(html.contains("Invalid username or password"));
        assert!(html.contains("value=\"login\""));
    }

    #[test]
    fn test_consent_form_lists_scopes() {
        let html = render_consent_form("Demo", "http://localhost:8080/cb", &["openid", "email"], "f");
        assert!(html.contains("Confirm your identity"));
        assert!(html.contains("<code>email</code>"));
        assert!(html.contains("value=\"approve\""));
    }

    #[test]
    fn test_pages_escape_untrusted_input() {
        let html = render_error_page("invalid_request", "<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));

        let html = render_login_form("\"><img src=x>", "f", None);
        assert!(!html.contains("<img"));
    }
}
