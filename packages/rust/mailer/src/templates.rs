//! Email layout and follow-up templates.
//!
//! Every outgoing HTML body goes through [`wrap_email_html`], a table-based
//! layout that renders in clients without flexbox support.

use leadflow_shared::OutreachConfig;

/// A subject and HTML body ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

struct FollowupTemplate {
    subject: &'static str,
    body: &'static str,
}

const FOLLOWUP_TEMPLATES: [FollowupTemplate; 3] = [
    FollowupTemplate {
        subject: "Quick follow-up: {company_name} analytics offer",
        body: r#"<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">Hi there,</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">I recently sent over a custom analytics overview we prepared specifically for <strong>{company_name}</strong>. Did you get a chance to take a look?</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">We help {category} businesses unlock hidden profits through data, and the first month is completely free.</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">If you have 15 minutes this week, I'd love to walk you through what we found.</p>
{button:Book a Free 15-Min Call}"#,
    },
    FollowupTemplate {
        subject: "Still available: free pilot dashboard for {company_name}",
        body: r#"<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">Hi,</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">Just a quick note: the free pilot offer we put together for <strong>{company_name}</strong> is still available. It includes:</p>
<ul style="color:#333333;font-size:15px;line-height:1.8;margin:0 0 16px;">
<li>A custom data dashboard built for your {category} business</li>
<li>First month completely free ($0)</li>
<li>No IT department or technical knowledge needed</li>
</ul>
{button:Schedule a Free Data Audit}"#,
    },
    FollowupTemplate {
        subject: "Last note: {company_name} custom analytics",
        body: r#"<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">Hi,</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">I wanted to reach out one last time about the custom analytics we prepared for <strong>{company_name}</strong>.</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">I understand if the timing isn't right. Running a {category} business keeps you busy. If data-driven decisions are something you'd like to explore later, our door is always open.</p>
<p style="color:#333333;font-size:15px;line-height:1.6;margin:0 0 16px;">The offer: <strong>$0 for the first month</strong>, then {monthly_price}.</p>
{button:Book a Call (No Pressure)}
<p style="color:#333333;font-size:15px;line-height:1.6;margin:16px 0 0;">Wishing you continued success,<br>The {brand_name} Team</p>"#,
    },
];

/// Number of distinct follow-up templates.
pub const FOLLOWUP_TEMPLATE_COUNT: usize = FOLLOWUP_TEMPLATES.len();

/// Template used for a lead that already received `followup_count` follow-ups.
pub fn followup_template_index(followup_count: u32) -> usize {
    (followup_count as usize).min(FOLLOWUP_TEMPLATE_COUNT - 1)
}

/// Subject of the initial email.
pub fn initial_subject(outreach: &OutreachConfig, company_name: &str) -> String {
    outreach
        .initial_subject
        .replace("{company_name}", company_name.trim())
}

/// Render the follow-up for a lead with `followup_count` follow-ups delivered.
///
/// `category` is lower-cased; leads without one read as "local".
pub fn render_followup(
    followup_count: u32,
    company_name: &str,
    category: Option<&str>,
    outreach: &OutreachConfig,
) -> RenderedEmail {
    let template = &FOLLOWUP_TEMPLATES[followup_template_index(followup_count)];
    let company_name = company_name.trim();
    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "local".to_string());

    let body = expand_button(template.body, &outreach.calendar_link)
        .replace("{company_name}", &escape_html(company_name))
        .replace("{category}", &escape_html(&category))
        .replace("{monthly_price}", &escape_html(&outreach.monthly_price))
        .replace("{brand_name}", &escape_html(&outreach.brand_name))
        .replace("{calendar_link}", &escape_html(&outreach.calendar_link));

    RenderedEmail {
        subject: template.subject.replace("{company_name}", company_name),
        html: wrap_email_html(&body, outreach),
    }
}

/// Replace a `{button:Label}` marker with a bulletproof table button.
fn expand_button(body: &str, link: &str) -> String {
    let Some(start) = body.find("{button:") else {
        return body.to_string();
    };
    let Some(len) = body[start..].find('}') else {
        return body.to_string();
    };
    let label = &body[start + "{button:".len()..start + len];
    let button = format!(
        r##"<table role="presentation" cellpadding="0" cellspacing="0" border="0" align="center" style="margin:25px auto;">
<tr><td align="center" bgcolor="#0056b3" style="background-color:#0056b3;border-radius:5px;">
<a href="{href}" style="display:inline-block;padding:12px 24px;color:#ffffff;background-color:#0056b3;text-decoration:none;font-weight:bold;font-family:Arial,Helvetica,sans-serif;border-radius:5px;">{label}</a>
</td></tr>
</table>"##,
        href = escape_html(link),
    );
    format!("{}{}{}", &body[..start], button, &body[start + len + 1..])
}

/// Wrap body HTML in the table-based email layout.
pub fn wrap_email_html(content: &str, outreach: &OutreachConfig) -> String {
    let brand = escape_html(&outreach.brand_name);
    let website = escape_html(&outreach.website);
    let logo = outreach
        .logo_url
        .as_deref()
        .map(|url| {
            format!(
                r#"<tr><td align="center" style="padding:24px 24px 0;"><img src="{}" alt="{brand}" width="120" style="display:block;border:0;"></td></tr>
"#,
                escape_html(url)
            )
        })
        .unwrap_or_default();

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{brand}</title>
</head>
<body style="margin:0;padding:0;background-color:#f4f4f4;">
<table role="presentation" width="100%" cellpadding="0" cellspacing="0" border="0" bgcolor="#f4f4f4" style="background-color:#f4f4f4;">
<tr><td align="center" style="padding:20px 10px;">
<table role="presentation" width="600" cellpadding="0" cellspacing="0" border="0" bgcolor="#ffffff" style="width:100%;max-width:600px;background-color:#ffffff;border:1px solid #e0e0e0;">
{logo}<tr><td style="padding:24px;font-family:Arial,Helvetica,sans-serif;color:#222222;">
{content}
</td></tr>
</table>
<table role="presentation" width="600" cellpadding="0" cellspacing="0" border="0" style="width:100%;max-width:600px;">
<tr><td align="center" style="padding:16px;font-family:Arial,Helvetica,sans-serif;font-size:12px;color:#999999;">
{brand} | <a href="{website}" style="color:#0056b3;">{website}</a><br>
Not interested? Reply "unsubscribe" and we won't email you again.
</td></tr>
</table>
</td></tr>
</table>
</body>
</html>
"##
    )
}

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(s: &str) -> String {
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
