//! Page planning: paths, titles and localized SEO metadata.
//!
//! The first page is always the home page at `/`. The content service proposes
//! the rest; its proposals are normalized to single-level lower-case slugs and
//! de-duplicated. When the service fails, a deterministic plan derived from the
//! template is used instead.

use std::collections::HashSet;

use blockweave_core::{
    PlannedPage, SeoMetadata, SiteTemplate, Usage, page_filename, site::HOME_PATH,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::gateway::{CompletionRequest, ContentGateway, GatewayError, Purpose, extract_json_object};

/// Planned pages plus the usage it took to plan them.
#[derive(Debug, Clone)]
pub struct PagePlan {
    pub pages: Vec<PlannedPage>,
    pub usage: Usage,
    /// Whether the fallback plan was used.
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    pages: Vec<PlanItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanItem {
    #[serde(default)]
    page_path: String,
    #[serde(default)]
    page_title: String,
    #[serde(default)]
    seo: Option<SeoMetadata>,
}

/// Plan the pages of `template`.
pub async fn plan_pages(
    gateway: &dyn ContentGateway,
    template: &SiteTemplate,
    prompt: &str,
    country: &str,
    language: &str,
) -> PagePlan {
    match request_plan(gateway, template, prompt, country, language).await {
        Ok((pages, usage)) => {
            info!(pages = pages.len(), "pages planned");
            PagePlan {
                pages,
                usage,
                fallback: false,
            }
        }
        Err(e) => {
            warn!(error = %e, "page planning failed, using fallback plan");
            PagePlan {
                pages: fallback_plan(template, prompt, country, language),
                usage: Usage::default(),
                fallback: true,
            }
        }
    }
}

async fn request_plan(
    gateway: &dyn ContentGateway,
    template: &SiteTemplate,
    prompt: &str,
    country: &str,
    language: &str,
) -> Result<(Vec<PlannedPage>, Usage), GatewayError> {
    let count = template.pages.len();
    let reply = gateway
        .complete(&CompletionRequest {
            purpose: Purpose::Pages,
            system: system_prompt(count, prompt, language),
            user: format!(
                "Generate SEO for {count} page(s). Business: \"{prompt}\". Language: {language}. Country: {country}."
            ),
        })
        .await?;

    let object = extract_json_object(&reply.text)?;
    let plan: PlanReply = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let mut seen = HashSet::new();
    let pages = template
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let (path, title, seo) = match plan.pages.get(index) {
                Some(item) => normalize_item(item, index),
                None => {
                    let (path, title) = fallback_path_title(page.title.as_deref(), index);
                    (path, title, None)
                }
            };
            let path = dedupe(&mut seen, path, index);
            let seo = seo.unwrap_or_else(|| fallback_seo(prompt, language, country, &title));
            PlannedPage {
                path,
                title,
                seo,
                layout: page.layout.clone(),
            }
        })
        .collect();

    Ok((pages, reply.usage))
}

fn normalize_item(item: &PlanItem, index: usize) -> (String, String, Option<SeoMetadata>) {
    if index == 0 {
        return (
            HOME_PATH.to_string(),
            HOME_TITLE.to_string(),
            item.seo.clone(),
        );
    }

    let slug = if item.page_path.trim().is_empty() {
        let source = if item.page_title.trim().is_empty() {
            format!("page-{index}")
        } else {
            item.page_title.clone()
        };
        slugify(&source)
    } else {
        slugify(&item.page_path)
    };
    let slug = if slug.is_empty() {
        format!("page-{index}")
    } else {
        slug
    };

    let title = if item.page_title.trim().is_empty() {
        title_case(&slug.replace('-', " "))
    } else {
        normalize_title(&item.page_title)
    };

    (format!("/{slug}"), title, item.seo.clone())
}

const HOME_TITLE: &str = "Home";

/// Single-level lower-case slug: separators become hyphens, anything outside
/// `[a-z0-9-]` is dropped.
#[must_use]
pub fn slugify(raw: &str) -> String {
    let mut slug = String::new();
    for c in raw.trim().trim_matches('/').chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if (c == '-' || c == '/' || c.is_whitespace()) && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Human-readable title: path separators removed, words capitalized, at most 50 characters.
#[must_use]
pub fn normalize_title(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    title_case(&collapsed)
        .chars()
        .take(50)
        .collect::<String>()
        .trim()
        .to_string()
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut boundary = true;
    for c in text.chars() {
        if boundary && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        boundary = !c.is_alphanumeric();
    }
    out
}

/// Suffix `path` until its archive file is unused. `/index` collides with the
/// home page's `index.html`.
fn dedupe(seen: &mut HashSet<String>, path: String, index: usize) -> String {
    let mut candidate = path.clone();
    let mut n = index + 1;
    while !seen.insert(page_filename(&candidate)) {
        candidate = format!("{path}-{n}");
        n += 1;
    }
    candidate
}

fn fallback_path_title(template_title: Option<&str>, index: usize) -> (String, String) {
    if index == 0 {
        return (HOME_PATH.to_string(), HOME_TITLE.to_string());
    }
    let title = template_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Page {}", index + 1));
    let slug = slugify(&title);
    let slug = if slug.is_empty() {
        format!("page-{}", index + 1)
    } else {
        slug
    };
    (format!("/{slug}"), title)
}

/// Deterministic plan from the template alone.
#[must_use]
pub fn fallback_plan(
    template: &SiteTemplate,
    prompt: &str,
    country: &str,
    language: &str,
) -> Vec<PlannedPage> {
    let mut seen = HashSet::new();
    template
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let (path, title) = fallback_path_title(page.title.as_deref(), index);
            PlannedPage {
                path: dedupe(&mut seen, path, index),
                seo: fallback_seo(prompt, language, country, &title),
                title,
                layout: page.layout.clone(),
            }
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// SEO metadata built from the prompt when the content service gives none.
#[must_use]
pub fn fallback_seo(prompt: &str, language: &str, country: &str, page_name: &str) -> SeoMetadata {
    let head = truncate(prompt, 40);
    let body = truncate(prompt, 140);
    let title = truncate(&format!("{head} - {page_name}"), 60);

    SeoMetadata {
        title: title.clone(),
        description: truncate(&format!("{body}. Serving {country} with quality services."), 160),
        keywords: format!("{prompt}, {page_name}, {country}, {language}"),
        og_title: title,
        og_description: truncate(
            &format!("{body}. Professional services in {country}."),
            160,
        ),
    }
}

fn system_prompt(count: usize, prompt: &str, language: &str) -> String {
    let paths = if count == 1 {
        "Generate SEO for a single homepage. pagePath must be \"/\", pageTitle must be \"Home\".".to_string()
    } else {
        format!(
            "Generate {count} different pages for: {prompt}.\n\
             pagePath starts with \"/\", is single level, lowercase with hyphens.\n\
             pageTitle is human readable English.\n\
             The first page is the homepage: pagePath \"/\", pageTitle \"Home\"."
        )
    };

    format!(
        "You are an SEO specialist.\n{paths}\n\n\
         Return a single JSON object:\n\
         {{\"pages\": [{{\"pagePath\": \"/...\", \"pageTitle\": \"...\", \"seo\": {{\
         \"title\": \"50-60 characters in {language}\", \
         \"description\": \"150-160 characters in {language}\", \
         \"keywords\": \"3-5 keywords in {language}\", \
         \"ogTitle\": \"social title in {language}\", \
         \"ogDescription\": \"social description in {language}\"}}}}]}}\n\
         Return only JSON."
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use blockweave_core::{LayoutSlot, TemplateGlobals, TemplatePage};

    use super::*;
    use crate::gateway::{Completion, GeneratedImage, Result as GatewayResult};

    struct FixedGateway(Option<String>);

    #[async_trait]
    impl ContentGateway for FixedGateway {
        async fn complete(&self, _request: &CompletionRequest) -> GatewayResult<Completion> {
            match &self.0 {
                Some(text) => Ok(Completion {
                    text: text.clone(),
                    usage: Usage::tokens(3, 4),
                }),
                None => Err(GatewayError::Request("offline".to_string())),
            }
        }

        async fn generate_image(&self, _description: &str) -> GatewayResult<GeneratedImage> {
            Err(GatewayError::Image("unused".to_string()))
        }
    }

    fn template(titles: &[Option<&str>]) -> SiteTemplate {
        SiteTemplate {
            id: "t".to_string(),
            name: String::new(),
            pages: titles
                .iter()
                .map(|t| TemplatePage {
                    title: t.map(str::to_string),
                    layout: vec![LayoutSlot::new("hero")],
                })
                .collect(),
            globals: TemplateGlobals::default(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("/Honda/Service/"), "honda-service");
        assert_eq!(slugify("Our Team!"), "our-team");
        assert_eq!(slugify("  --a   b--  "), "a-b");
        assert_eq!(slugify("Über"), "ber");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("honda/service"), "Honda Service");
        assert_eq!(normalize_title("about   us"), "About Us");
        assert_eq!(normalize_title(&"x".repeat(80)).chars().count(), 50);
    }

    #[test]
    fn test_fallback_seo_truncates() {
        let prompt = "p".repeat(200);
        let seo = fallback_seo(&prompt, "en", "us", "Home");

        assert!(seo.title.chars().count() <= 60);
        assert!(seo.description.chars().count() <= 160);
        assert!(seo.keywords.ends_with("Home, us, en"));
    }

    #[tokio::test]
    async fn test_plan_normalizes_reply() {
        let reply = r#"{"pages": [
            {"pagePath": "/welcome", "pageTitle": "Welcome", "seo": {"title": "Bakery"}},
            {"pagePath": "/Our Services/", "pageTitle": "our/services", "seo": {"title": "Services"}},
            {"pagePath": "/our-services", "pageTitle": "Again"}
        ]}"#;
        let gateway = FixedGateway(Some(reply.to_string()));
        let template = template(&[None, Some("Services"), Some("More")]);

        let plan = plan_pages(&gateway, &template, "a bakery", "fr", "fr").await;

        assert!(!plan.fallback);
        assert_eq!(plan.usage.total_tokens, 7);
        let paths: Vec<_> = plan.pages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/our-services", "/our-services-3"]);
        assert_eq!(plan.pages[0].title, "Home");
        assert_eq!(plan.pages[0].seo.title, "Bakery");
        assert_eq!(plan.pages[1].title, "Our Services");
        assert!(plan.pages[2].seo.title.contains("Again"));
        assert_eq!(plan.pages[2].layout, vec![LayoutSlot::new("hero")]);
    }

    #[tokio::test]
    async fn test_short_reply_is_completed() {
        let reply = r#"{"pages": [{"pagePath": "/", "pageTitle": "Home"}]}"#;
        let gateway = FixedGateway(Some(reply.to_string()));
        let template = template(&[None, Some("Contact")]);

        let plan = plan_pages(&gateway, &template, "a bakery", "fr", "fr").await;

        assert_eq!(plan.pages.len(), 2);
        assert_eq!(plan.pages[1].path, "/contact");
        assert_eq!(plan.pages[1].title, "Contact");
    }

    #[tokio::test]
    async fn test_gateway_failure_uses_fallback() {
        let gateway = FixedGateway(None);
        let template = template(&[Some("Start"), Some("Services"), None]);

        let plan = plan_pages(&gateway, &template, "a bakery", "fr", "fr").await;

        assert!(plan.fallback);
        assert!(plan.usage.is_empty());
        let paths: Vec<_> = plan.pages.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/services", "/page-3"]);
        assert_eq!(plan.pages[0].title, "Home");
        assert_eq!(plan.pages[2].title, "Page 3");
    }

    fn filenames(plan: &[PlannedPage]) -> Vec<String> {
        plan.iter().map(|p| page_filename(&p.path)).collect()
    }

    #[test]
    fn test_fallback_index_page_gets_own_file() {
        let template = template(&[Some("Home"), Some("Index")]);

        let pages = fallback_plan(&template, "a bakery", "fr", "fr");

        assert_eq!(pages[1].path, "/index-2");
        assert_eq!(filenames(&pages), vec!["index.html", "index-2.html"]);
    }

    #[tokio::test]
    async fn test_planned_index_page_gets_own_file() {
        let reply = r#"{"pages": [
            {"pagePath": "/", "pageTitle": "Home"},
            {"pagePath": "/index", "pageTitle": "Index"},
            {"pagePath": "/Index/", "pageTitle": "Index again"}
        ]}"#;
        let gateway = FixedGateway(Some(reply.to_string()));
        let template = template(&[None, None, None]);

        let plan = plan_pages(&gateway, &template, "a bakery", "fr", "fr").await;

        assert!(!plan.fallback);
        assert_eq!(
            filenames(&plan.pages),
            vec!["index.html", "index-2.html", "index-3.html"]
        );
    }

    #[tokio::test]
    async fn test_malformed_reply_uses_fallback() {
        let gateway = FixedGateway(Some(r#"{"pages": "nope"}"#.to_string()));
        let template = template(&[None]);

        let plan = plan_pages(&gateway, &template, "a bakery", "fr", "fr").await;

        assert!(plan.fallback);
        assert_eq!(plan.pages[0].path, "/");
    }
}
