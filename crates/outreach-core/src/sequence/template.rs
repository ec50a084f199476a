//! Template rendering and tracking-link instrumentation

use outreach_storage::models::{Contact, SendingAccount};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}").expect("valid placeholder regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid url regex"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="(https?://[^"]+)""#).expect("valid href regex"))
}

/// Split a bare URL match from sentence punctuation and escaped quotes around it
fn split_url_tail(candidate: &str) -> (&str, &str) {
    const ENTITIES: [&str; 5] = ["&quot;", "&#39;", "&gt;", "&lt;", "&amp;"];
    let mut end = candidate.len();
    loop {
        let url = &candidate[..end];
        if let Some(entity) = ENTITIES.iter().find(|e| url.ends_with(**e)) {
            end -= entity.len();
            continue;
        }
        match url.chars().last() {
            Some('.' | ',' | ';' | ':' | '!' | '?' | '\'') => end -= 1,
            // Keep parentheses that belong to the URL itself
            Some(')') if url.matches(')').count() > url.matches('(').count() => end -= 1,
            _ => break,
        }
    }
    candidate.split_at(end)
}

/// Values available to a template
pub struct RenderContext<'a> {
    pub contact: &'a Contact,
    pub campaign_name: &'a str,
    pub sender: Option<&'a SendingAccount>,
    /// Per-enrollment variables (`{{vars.key}}`)
    pub variables: &'a Value,
    pub unsubscribe_url: Option<&'a str>,
}

/// Renders `{{placeholder}}` templates against a contact
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Substitute every placeholder in one pass; unknown ones render empty
    pub fn render(&self, template: &str, ctx: &RenderContext<'_>) -> String {
        placeholder_re()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                Self::lookup(&caps[1], ctx).unwrap_or_default()
            })
            .into_owned()
    }

    fn lookup(key: &str, ctx: &RenderContext<'_>) -> Option<String> {
        let contact = ctx.contact;
        if let Some(attr) = key.strip_prefix("attributes.") {
            return contact.attributes.get(attr).map(value_to_string);
        }
        if let Some(var) = key.strip_prefix("vars.") {
            return ctx.variables.get(var).map(value_to_string);
        }

        match key {
            "first_name" => contact.first_name.clone(),
            "last_name" => contact.last_name.clone(),
            "name" => Some(contact.full_name()),
            "email" => Some(contact.email.clone()),
            "company" => contact.company.clone(),
            "title" => contact.title.clone(),
            "linkedin_url" => contact.linkedin_url.clone(),
            "campaign_name" => Some(ctx.campaign_name.to_string()),
            "sender_name" => ctx.sender.and_then(|s| s.display_name.clone()),
            "sender_email" => ctx.sender.map(|s| s.email.clone()),
            "unsubscribe_url" => ctx.unsubscribe_url.map(str::to_string),
            _ => None,
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builds open/click/unsubscribe URLs under the public tracking base
#[derive(Debug, Clone)]
pub struct TrackingLinks {
    base_url: String,
}

impl TrackingLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn open_url(&self, token: &str) -> String {
        format!("{}/o/{}", self.base_url, token)
    }

    /// `/c/:token?url=<percent-encoded target>`
    pub fn click_url(&self, token: &str, target: &str) -> String {
        match reqwest::Url::parse_with_params(
            &format!("{}/c/{}", self.base_url, token),
            &[("url", target)],
        ) {
            Ok(url) => url.to_string(),
            Err(_) => target.to_string(),
        }
    }

    pub fn unsubscribe_url(&self, token: &str) -> String {
        format!("{}/u/{}", self.base_url, token)
    }

    /// Plain text to minimal HTML: escaped, line breaks kept, bare URLs linked
    pub fn text_to_html(text: &str) -> String {
        let escaped = text
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;");
        let linked = url_re().replace_all(&escaped, |caps: &regex::Captures<'_>| {
            let (url, tail) = split_url_tail(&caps[0]);
            format!(r#"<a href="{url}">{url}</a>{tail}"#)
        });
        format!("<html><body>{}</body></html>", linked.replace('\n', "<br>\n"))
    }

    /// Route links through the click endpoint and append the open pixel.
    /// Unsubscribe links are left alone.
    pub fn instrument_html(&self, html: &str, token: &str) -> String {
        let unsubscribe = self.unsubscribe_url(token);
        let rewritten = href_re().replace_all(html, |caps: &regex::Captures<'_>| {
            let target = caps[1].replace("&amp;", "&");
            if target == unsubscribe {
                caps[0].to_string()
            } else {
                let click = self.click_url(token, &target).replace('&', "&amp;");
                format!(r#"href="{}""#, click)
            }
        });

        let pixel = format!(
            r#"<img src="{}" width="1" height="1" alt="" style="display:none" />"#,
            self.open_url(token)
        );
        match rewritten.rfind("</body>") {
            Some(pos) => format!("{}{}{}", &rewritten[..pos], pixel, &rewritten[pos..]),
            None => format!("{}{}", rewritten, pixel),
        }
    }
}
