use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;

use crate::crawler::{Crawler, CrawlerError};
use crate::models::job::RawJob;
use crate::models::search::SpiderConfig;

/// RFC 3986 unreserved characters, left untouched in query values.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const BASE_SEARCH_URL: &str =
    "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
const BASE_JOB_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/jobPosting/";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Guest endpoints throttle aggressively; keep at least a second between
/// consecutive requests.
const COURTESY_DELAY: Duration = Duration::from_secs(1);

pub struct LinkedInCrawler {
    http: reqwest::Client,
    base_search_url: String,
    base_job_url: String,
    courtesy_delay: Duration,
    patterns: Patterns,
    requests_sent: u64,
}

struct Patterns {
    job_urn: Regex,
    title: Regex,
    job_link: Regex,
    org_link: Regex,
    location: Regex,
    description: Regex,
    criteria: Regex,
    tag: Regex,
}

impl Patterns {
    fn new() -> Result<Patterns, CrawlerError> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|e| CrawlerError::Parse(format!("bad pattern: {e}")))
        };
        Ok(Patterns {
            job_urn: build(r#"data-entity-urn="urn:li:jobPosting:(\d+)""#)?,
            title: build(r#"(?s)<h2[^>]*top-card-layout__title[^>]*>(.*?)</h2>"#)?,
            job_link: build(r#"<a[^>]*class="[^"]*topcard__link[^"]*"[^>]*href="([^"]+)""#)?,
            org_link: build(
                r#"(?s)<a[^>]*class="[^"]*topcard__org-name-link[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#,
            )?,
            location: build(
                r#"(?s)<span[^>]*class="[^"]*topcard__flavor--bullet[^"]*"[^>]*>(.*?)</span>"#,
            )?,
            description: build(
                r#"(?s)<div[^>]*class="[^"]*show-more-less-html__markup[^"]*"[^>]*>(.*?)</div>"#,
            )?,
            criteria: build(
                r#"(?s)<h3[^>]*description__job-criteria-subheader[^>]*>(.*?)</h3>\s*<span[^>]*description__job-criteria-text[^>]*>(.*?)</span>"#,
            )?,
            tag: build(r"<[^>]+>")?,
        })
    }
}

impl LinkedInCrawler {
    pub fn new() -> Result<LinkedInCrawler, CrawlerError> {
        LinkedInCrawler::with_endpoints(
            BASE_SEARCH_URL.to_string(),
            BASE_JOB_URL.to_string(),
            COURTESY_DELAY,
        )
    }

    fn with_endpoints(
        base_search_url: String,
        base_job_url: String,
        courtesy_delay: Duration,
    ) -> Result<LinkedInCrawler, CrawlerError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CrawlerError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(LinkedInCrawler {
            http,
            base_search_url,
            base_job_url,
            courtesy_delay,
            patterns: Patterns::new()?,
            requests_sent: 0,
        })
    }

    /// One outstanding request at a time, with the courtesy delay between
    /// consecutive ones.
    async fn throttle(&mut self) {
        if self.requests_sent > 0 {
            tokio::time::sleep(self.courtesy_delay).await;
        }
        self.requests_sent += 1;
    }

    fn search_url(&self, config: &SpiderConfig, start: u32) -> String {
        format!(
            "{}?keywords={}&location={}&f_TPR=r86400&f_E={}&start={start}",
            self.base_search_url,
            urlencoded(&config.keywords),
            urlencoded(&config.location),
            config.seniority,
        )
    }

    async fn fetch_search_page(
        &mut self,
        config: &SpiderConfig,
        start: u32,
    ) -> Result<String, CrawlerError> {
        self.throttle().await;
        let url = self.search_url(config, start);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CrawlerError::Request(format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CrawlerError::Request(format!(
                "search returned {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CrawlerError::Request(format!("search body unreadable: {e}")))
    }

    async fn fetch_job(&mut self, job_id: &str) -> Result<Option<RawJob>, CrawlerError> {
        self.throttle().await;
        let url = format!("{}{job_id}", self.base_job_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CrawlerError::Request(format!("job detail request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CrawlerError::Request(format!(
                "job detail returned {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CrawlerError::Request(format!("job detail body unreadable: {e}")))?;

        Ok(self.parse_job(job_id, &html))
    }

    /// Extract the RawJob shape from a detail page. Returns None when the
    /// required fields are missing; everything non-critical defaults to
    /// "N/A".
    fn parse_job(&self, job_id: &str, html: &str) -> Option<RawJob> {
        let title = self
            .patterns
            .title
            .captures(html)
            .map(|c| self.text(&c[1]))
            .filter(|t| !t.is_empty())?;

        let (employer, employer_url) = match self.patterns.org_link.captures(html) {
            Some(c) => (self.text(&c[2]), clean(&c[1])),
            None => (na(), na()),
        };

        let job_url = self
            .patterns
            .job_link
            .captures(html)
            .map(|c| clean(&c[1]))
            .unwrap_or_else(na);

        let job_location = self
            .patterns
            .location
            .captures(html)
            .map(|c| self.text(&c[1]))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(na);

        // Description keeps its markup, whitespace-collapsed.
        let job_description = self
            .patterns
            .description
            .captures(html)
            .map(|c| clean(&c[1]))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(na);

        let mut seniority_level = na();
        let mut employment_type = na();
        let mut job_function = na();
        let mut industries = na();
        for capture in self.patterns.criteria.captures_iter(html) {
            let header = self.text(&capture[1]).to_lowercase();
            let value = self.text(&capture[2]);
            if value.is_empty() {
                continue;
            }
            match header.as_str() {
                "seniority level" => seniority_level = value,
                "employment type" => employment_type = value,
                "job function" => job_function = value,
                "industries" => industries = value,
                _ => {}
            }
        }

        Some(RawJob {
            job_id: job_id.to_string(),
            job_title: title,
            job_url,
            job_location,
            employer,
            employer_url,
            job_description,
            seniority_level,
            employment_type,
            job_function,
            industries,
            source: "linkedin".to_string(),
        })
    }

    /// Strip tags, decode common entities and collapse whitespace.
    fn text(&self, fragment: &str) -> String {
        let stripped = self.patterns.tag.replace_all(fragment, " ");
        clean(&decode_entities(&stripped))
    }
}

#[async_trait]
impl Crawler for LinkedInCrawler {
    fn name(&self) -> &str {
        "linkedin"
    }

    async fn crawl(&mut self, config: &SpiderConfig) -> Result<Vec<RawJob>, CrawlerError> {
        let mut jobs: Vec<RawJob> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut start = 0u32;

        'pages: while (jobs.len() as u32) < config.max_jobs {
            let page = self.fetch_search_page(config, start).await?;

            let page_ids: Vec<String> = self
                .patterns
                .job_urn
                .captures_iter(&page)
                .map(|c| c[1].to_string())
                .filter(|id| seen.insert(id.clone()))
                .collect();

            if page_ids.is_empty() {
                tracing::info!("reached the end of the search results");
                break;
            }

            let mut consumed = 0u32;
            for job_id in &page_ids {
                if jobs.len() as u32 >= config.max_jobs {
                    break 'pages;
                }
                consumed += 1;
                match self.fetch_job(job_id).await {
                    Ok(Some(job)) => jobs.push(job),
                    Ok(None) => {
                        tracing::warn!(job_id = %job_id, "detail page missing required fields, skipped");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "detail fetch failed, skipped");
                    }
                }
            }
            start += consumed;
        }

        Ok(jobs)
    }
}

fn urlencoded(value: &str) -> String {
    utf8_percent_encode(value, QUERY_SET).to_string()
}

fn na() -> String {
    "N/A".to_string()
}

/// Collapse runs of whitespace into single spaces, trimming the ends.
fn clean(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
