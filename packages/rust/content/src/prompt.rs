//! Prompt construction for personalized outreach emails.

use leadflow_shared::{Lead, OutreachConfig};

/// The lead facts a prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub company_name: &'a str,
    pub category: Option<&'a str>,
    pub address: Option<&'a str>,
    pub description: Option<&'a str>,
}

impl<'a> From<&'a Lead> for PromptInput<'a> {
    fn from(lead: &'a Lead) -> Self {
        Self {
            company_name: &lead.company_name,
            category: lead.category.as_deref(),
            address: lead.address.as_deref(),
            description: lead.description.as_deref(),
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Build the generation prompt for one lead.
///
/// Leads with a scraped description get instructions to reference it
/// directly; the rest are personalized from name, category and location.
pub fn build_prompt(input: PromptInput<'_>, outreach: &OutreachConfig) -> String {
    let company = input.company_name.trim();
    let category = non_blank(input.category).unwrap_or("local business");
    let address = non_blank(input.address);
    let description = non_blank(input.description);

    let mut context = vec![
        format!("Business Name: {company}"),
        format!("Industry: {category}"),
    ];
    if let Some(address) = address {
        context.push(format!("Location: {address}"));
    }
    if let Some(description) = description {
        context.push(format!("About Them: {description}"));
    }
    let context = context.join("\n");

    let personalization = match description {
        Some(description) => format!(
            "PERSONALIZATION (this is what makes the email feel hand-crafted):\n\
             - You know this about them: \"{description}\"\n\
             - Reference something specific from their description in your opening line.\n\
             - The 3 dashboard metrics you propose MUST connect to what they actually do,\n\
             \x20 not generic category metrics."
        ),
        None => format!(
            "PERSONALIZATION:\n\
             - You don't have a specific description, so use the business name and category\n\
             \x20 to infer what they likely do. Reference their name and location naturally.\n\
             - Propose 3 dashboard metrics that are highly specific to the {category} industry\n\
             \x20 in their local market."
        ),
    };

    let brand = &outreach.brand_name;
    let website = &outreach.website;
    let calendar = &outreach.calendar_link;
    let price = &outreach.monthly_price;
    let logo = match &outreach.logo_url {
        Some(url) => format!(
            "   - Logo: <img src=\"{url}\" alt=\"{brand}\" width=\"140\" \
             style=\"display:block;margin:0 auto 15px;\" />\n"
        ),
        None => String::new(),
    };

    format!(
        "You are writing a personalized cold email infographic for {brand} ({website}),\n\
a data & AI consulting firm that builds custom analytics dashboards for small businesses.

TARGET BUSINESS:
{context}

{personalization}

GENERATE a single self-contained HTML email (no JavaScript, inline CSS only) with these sections:

1. HEADER
{logo}   - A personalized headline that mentions {company} by name.

2. THE HOOK (2-3 sentences)
   - A short opening that shows you understand their specific business.
   - Transition into: \"Here's what a custom data stack could unlock for you.\"

3. THREE CUSTOM DASHBOARDS
   - Each with a title, a 1-2 sentence description of what it tracks, and a concrete
     example of the insight it would surface. Specific to THIS business, never generic.

4. AI ADVANTAGE (brief)
   - {brand} builds and manages the entire data + AI stack, so no IT department is needed.

5. RISK-FREE OFFER
   - First month: $0, a free pilot dashboard with no commitment.
   - After that: {price} for a fully managed data & AI stack.

6. CALL TO ACTION
   - One prominent button: \"Schedule a Free 15-Min Call\" linking to {calendar}
   - Button style: display:inline-block; padding:14px 28px; background-color:#0056b3;
     color:#ffffff; text-decoration:none; font-weight:bold; border-radius:6px;

DESIGN RULES:
- Wrap everything in a <div> with max-width:600px, background-color:#ffffff and
  font-family:Arial,Helvetica,sans-serif. Tables are fine; never use display:flex or grid.
- White background, dark text (#222), muted blue accents (#0056b3). No gradients.
- Font sizes 14-16px body, 20-22px headers, line height 1.6.

OUTPUT: Raw HTML only. No markdown, no code fences, no explanation text.
Just the literal HTML starting with <div and ending with </div>."
    )
}
