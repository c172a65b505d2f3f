use chrono::{DateTime, Utc};
use handlebars::Handlebars;

use crate::{
    address::BaseAddress,
    model::{self, LinkRecord},
};

/// How much of an original URL the recent-links list shows.
pub const TRUNCATE_AT: u64 = 50;

const RECENT_TEMPLATE: &str = r#"{{#each links}}{{truncate originalUrl @root.max}}
    {{shortUrl}}  [{{clicks}} clicks, {{dateformat createdAt "%Y-%m-%d %H:%M"}}]
{{else}}No links shortened yet.
{{/each}}"#;

const CREATED_TEMPLATE: &str = r#"{{link.shortUrl}}
    -> {{link.originalUrl}}
"#;

const DETAIL_TEMPLATE: &str = r#"code:     {{link.shortCode}}
short:    {{link.shortUrl}}
original: {{link.originalUrl}}
created:  {{dateformat link.createdAt "%Y-%m-%d %H:%M:%S UTC"}}
clicks:   {{link.clicks}}
"#;

handlebars::handlebars_helper!(truncate: |url: String, max: u64| {
    model::truncate_url(&url, max as usize)
});
handlebars::handlebars_helper!(date_format: |t: String, format: String| {
    match DateTime::parse_from_rfc3339(&t) {
        Ok(parsed) => parsed.with_timezone(&Utc).format(&format).to_string(),
        Err(_) => t.to_string(),
    }
});

/// Renderer turns registry output into the text the CLI prints.
#[derive(Clone, Debug)]
pub struct Renderer {
    base: BaseAddress,
    pub(crate) handlebars: Handlebars<'static>,
}

impl Renderer {
    pub fn new(base: BaseAddress) -> Result<Self, handlebars::TemplateError> {
        let mut bars = Handlebars::new();
        bars.register_escape_fn(handlebars::no_escape);
        bars.register_helper("truncate", Box::new(truncate));
        bars.register_helper("dateformat", Box::new(date_format));
        bars.register_template_string("recent", RECENT_TEMPLATE)?;
        bars.register_template_string("created", CREATED_TEMPLATE)?;
        bars.register_template_string("detail", DETAIL_TEMPLATE)?;
        Ok(Self { base, handlebars: bars })
    }

    /// The recent-links list, newest first.
    pub fn recent(&self, links: &[LinkRecord]) -> Result<String, handlebars::RenderError> {
        let links: Vec<_> = links.iter().map(|link| link.to_stored(&self.base)).collect();
        self.handlebars.render(
            "recent",
            &serde_json::json!({"links": links, "max": TRUNCATE_AT}),
        )
    }

    pub fn created(&self, link: &LinkRecord) -> Result<String, handlebars::RenderError> {
        self.handlebars
            .render("created", &serde_json::json!({"link": link.to_stored(&self.base)}))
    }

    pub fn detail(&self, link: &LinkRecord) -> Result<String, handlebars::RenderError> {
        self.handlebars
            .render("detail", &serde_json::json!({"link": link.to_stored(&self.base)}))
    }
}
