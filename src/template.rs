//! `{{ token }}` substitution and plain-text to HTML conversion for campaign emails.
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;

use crate::model::{Campaign, Company, EmailTemplate, Enrichment, User};

pub type TemplateVars = BTreeMap<String, String>;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex"));

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("blank line regex"));

const DEFAULT_OWNER_NAME: &str = "Hello";
const DEFAULT_INDUSTRY: &str = "your industry";
const DEFAULT_SENDER_NAME: &str = "Exit School Team";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Replace `{{ key }}` for every key in `vars`. Placeholders without a value
/// are left as they are.
pub fn substitute(input: &str, vars: &TemplateVars) -> String {
    let mut out = input.to_string();
    for (key, value) in vars {
        let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key));
        // Keys are escaped, so the pattern always compiles.
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, NoExpand(value)).into_owned();
        }
    }
    out
}

pub fn render(template: &EmailTemplate, vars: &TemplateVars, reply_to: &str) -> RenderedEmail {
    let subject = substitute(&template.subject, vars);
    let text_body = substitute(&template.body, vars);
    let html_body = text_to_html(&text_body, reply_to);
    RenderedEmail {
        subject,
        text_body,
        html_body,
    }
}

/// Paragraphs are separated by blank lines; single newlines become `<br>`.
pub fn text_to_html(text: &str, reply_to: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let paragraphs: String = BLANK_LINE
        .split(&normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let lines: Vec<String> = p.lines().map(|l| escape_html(l.trim_end())).collect();
            format!("<p>{}</p>\n", lines.join("<br>\n"))
        })
        .collect();

    let reply_to = escape_html(reply_to);
    format!(
        "<!DOCTYPE html>\n<html>\n<body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\n\
         <div style=\"max-width: 600px; margin: 0 auto; padding: 20px;\">\n\
         {paragraphs}\
         <hr style=\"border: none; border-top: 1px solid #eee; margin: 24px 0;\">\n\
         <p style=\"font-size: 12px; color: #888;\">Questions? Just reply to this email or write to \
         <a href=\"mailto:{reply_to}\">{reply_to}</a>.</p>\n\
         </div>\n</body>\n</html>\n"
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Values substituted into outreach emails, with their fallbacks applied.
pub fn outreach_variables(
    campaign: &Campaign,
    owner: &User,
    company: &Company,
    enrichment: Option<&Enrichment>,
) -> TemplateVars {
    fn non_empty(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }

    let owner_name = non_empty(enrichment.and_then(|e| e.owner_name.as_deref()))
        .unwrap_or(DEFAULT_OWNER_NAME);
    let industry = non_empty(company.industry.as_deref())
        .or_else(|| non_empty(Some(campaign.industry.as_str())))
        .unwrap_or(DEFAULT_INDUSTRY);
    let sender_name = non_empty(owner.full_name.as_deref()).unwrap_or(DEFAULT_SENDER_NAME);
    let website = non_empty(company.website.as_deref()).unwrap_or(&company.name);

    let mut vars = TemplateVars::new();
    vars.insert("company_name".into(), company.name.clone());
    vars.insert("owner_name".into(), owner_name.to_string());
    vars.insert("industry".into(), industry.to_string());
    vars.insert("sender_name".into(), sender_name.to_string());
    vars.insert("website".into(), website.to_string());
    vars
}

impl EmailTemplate {
    /// Distinct placeholder tokens used in subject and body, in first-seen order.
    pub fn placeholders(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for text in [&self.subject, &self.body] {
            for cap in PLACEHOLDER.captures_iter(text) {
                let token = cap[1].to_string();
                if !seen.contains(&token) {
                    seen.push(token);
                }
            }
        }
        seen
    }

    /// Placeholders the template uses but does not declare.
    pub fn undeclared_placeholders(&self) -> Vec<String> {
        self.placeholders()
            .into_iter()
            .filter(|t| !self.variables.contains(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn template(subject: &str, body: &str) -> EmailTemplate {
        EmailTemplate {
            id: "t1".into(),
            name: "intro".into(),
            subject: subject.into(),
            body: body.into(),
            variables: vec!["company_name".into(), "owner_name".into()],
        }
    }

    #[test]
    fn substitutes_known_keys() {
        assert_eq!(substitute("Hi {{name}}", &vars(&[("name", "Alice")])), "Hi Alice");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let out = substitute("{{ name }} / {{name  }} / {{\tname}}", &vars(&[("name", "A")]));
        assert_eq!(out, "A / A / A");
    }

    #[test]
    fn leaves_unknown_placeholders_verbatim() {
        let out = substitute("Hi {{name}}, {{missing}}", &vars(&[("name", "Alice")]));
        assert_eq!(out, "Hi Alice, {{missing}}");
    }

    #[test]
    fn values_are_not_treated_as_replacement_syntax() {
        let out = substitute("Price: {{p}}", &vars(&[("p", "$1 and ${name}")]));
        assert_eq!(out, "Price: $1 and ${name}");
    }

    #[test]
    fn html_splits_paragraphs_and_breaks_lines() {
        let html = text_to_html("Hi Ann,\n\nLine one\nLine two\n\n\nBye", "team@example.com");
        assert!(html.contains("<p>Hi Ann,</p>"));
        assert!(html.contains("<p>Line one<br>\nLine two</p>"));
        assert!(html.contains("<p>Bye</p>"));
        assert!(html.contains("href=\"mailto:team@example.com\""));
    }

    #[test]
    fn html_escapes_content() {
        let html = text_to_html("A & B <script>", "team@example.com");
        assert!(html.contains("A &amp; B &lt;script&gt;"));
    }

    #[test]
    fn render_applies_to_subject_and_body() {
        let t = template("Quick question for {{company_name}}", "{{ owner_name }},\n\nWe like {{company_name}}.");
        let out = render(
            &t,
            &vars(&[("company_name", "Acme"), ("owner_name", "Ann")]),
            "team@example.com",
        );
        assert_eq!(out.subject, "Quick question for Acme");
        assert_eq!(out.text_body, "Ann,\n\nWe like Acme.");
        assert!(out.html_body.contains("<p>We like Acme.</p>"));
    }

    #[test]
    fn placeholder_scan_reports_undeclared() {
        let t = template("{{company_name}}", "{{owner_name}} {{ website }} {{website}}");
        assert_eq!(t.placeholders(), vec!["company_name", "owner_name", "website"]);
        assert_eq!(t.undeclared_placeholders(), vec!["website"]);
    }

    #[test]
    fn outreach_variables_apply_fallbacks() {
        let campaign = Campaign {
            id: "c".into(),
            user_id: "u".into(),
            template_id: "t".into(),
            industry: "".into(),
            is_active: true,
            weekday: 2,
            hour: 10,
            max_sends: None,
        };
        let owner = User {
            id: "u".into(),
            email: "o@example.com".into(),
            full_name: None,
        };
        let company = Company {
            id: "co".into(),
            name: "Acme".into(),
            website: None,
            industry: None,
        };
        let v = outreach_variables(&campaign, &owner, &company, None);
        assert_eq!(v["owner_name"], "Hello");
        assert_eq!(v["industry"], "your industry");
        assert_eq!(v["sender_name"], "Exit School Team");
        assert_eq!(v["website"], "Acme");
        assert_eq!(v["company_name"], "Acme");

        let campaign = Campaign {
            industry: "Plumbing".into(),
            ..campaign
        };
        let enrichment = Enrichment {
            id: "e".into(),
            company_id: "co".into(),
            owner_name: Some("Ann".into()),
            owner_email: Some("ann@acme.test".into()),
        };
        let v = outreach_variables(&campaign, &owner, &company, Some(&enrichment));
        assert_eq!(v["owner_name"], "Ann");
        assert_eq!(v["industry"], "Plumbing");
    }
}
