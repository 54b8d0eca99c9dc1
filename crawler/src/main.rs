use anyhow::{anyhow, Context, Result};
use clap::Parser;
use orbweaver_core::tokenizer::raw_tokens;
use orbweaver_core::{Engine, FetchedPage, PageFetcher};
use reqwest::blocking::Client;
use reqwest::header;
use scraper::{Html, Selector};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::time::Duration;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "orbweaver-crawler")]
#[command(about = "Crawl a bounded web graph into the search index, respecting robots.txt")]
struct Cli {
    /// Seed URL to start the breadth-first crawl from
    #[arg(long)]
    seed: String,
    /// Index database directory
    #[arg(long, default_value = "./orbweaver-db")]
    db: String,
    /// Maximum number of pages to visit
    #[arg(long, default_value_t = 30)]
    max_pages: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long, default_value = "orbweaver-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Skip robots.txt checks
    #[arg(long, default_value_t = false)]
    ignore_robots: bool,
    /// Write the per-document crawl summary to this file instead of stdout
    #[arg(long)]
    report: Option<String>,
}

#[derive(Debug, Clone)]
struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

struct HttpFetcher {
    client: Client,
    user_agent: String,
    respect_robots: bool,
    robots_cache: RefCell<HashMap<String, Robots>>,
    max_page_bytes: usize,
}

impl HttpFetcher {
    fn new(args: &Cli) -> Result<HttpFetcher> {
        let client = Client::builder()
            .user_agent(args.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(args.timeout_secs))
            .build()?;
        Ok(HttpFetcher {
            client,
            user_agent: args.user_agent.clone(),
            respect_robots: !args.ignore_robots,
            robots_cache: RefCell::new(HashMap::new()),
            max_page_bytes: 2 * 1024 * 1024,
        })
    }

    fn allowed(&self, url: &Url) -> Result<bool> {
        let Some(host) = url.host_str() else { return Ok(false) };
        let cached = self.robots_cache.borrow().get(host).cloned();
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
                let txt = match self
                    .client
                    .get(&robots_url)
                    .header(header::USER_AGENT, &self.user_agent)
                    .send()
                {
                    Ok(resp) if resp.status().is_success() => resp.text().unwrap_or_default(),
                    _ => String::new(),
                };
                let parsed = parse_robots(&txt);
                self.robots_cache
                    .borrow_mut()
                    .insert(host.to_string(), parsed.clone());
                parsed
            }
        };
        Ok(path_allowed(url.path(), &rules))
    }

    fn crawl_delay(&self, url: &Url) -> Option<u64> {
        let host = url.host_str()?;
        self.robots_cache
            .borrow()
            .get(host)
            .and_then(|r| r.crawl_delay_ms)
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let url = Url::parse(url).context("invalid url")?;
        if self.respect_robots {
            if !self.allowed(&url)? {
                return Err(anyhow!("disallowed by robots.txt"));
            }
            if let Some(delay) = self.crawl_delay(&url) {
                std::thread::sleep(Duration::from_millis(delay));
            }
        }

        let resp = self.client.get(url.clone()).send()?;
        if !resp.status().is_success() {
            return Err(anyhow!("http status {}", resp.status()));
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
            let ct = ct.to_str().unwrap_or_default();
            if !ct.starts_with("text/html") {
                return Err(anyhow!("unsupported content type {ct}"));
            }
        }
        // HTTP Last-Modified is RFC 2822 shaped; pages without the header
        // count as modified now and re-index on every crawl.
        let last_modified = resp
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| OffsetDateTime::parse(v, &Rfc2822).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let bytes = resp.bytes()?;
        if bytes.len() > self.max_page_bytes {
            return Err(anyhow!("page exceeds {} bytes", self.max_page_bytes));
        }
        let html = String::from_utf8_lossy(&bytes).to_string();

        let doc = Html::parse_document(&html);
        let sel_title = Selector::parse("title").expect("valid selector");
        let sel_body = Selector::parse("body").expect("valid selector");
        let sel_a = Selector::parse("a").expect("valid selector");

        let title = doc
            .select(&sel_title)
            .next()
            .map(|n| n.text().collect::<String>())
            .unwrap_or_default();
        let body = doc
            .select(&sel_body)
            .next()
            .map(|n| n.text().collect::<String>())
            .unwrap_or_default();

        let mut links = BTreeSet::new();
        for a in doc.select(&sel_a) {
            if let Some(href) = a.value().attr("href") {
                if let Ok(mut resolved) = Url::parse(href).or_else(|_| url.join(href)) {
                    if resolved.scheme().starts_with("http") {
                        resolved.set_fragment(None);
                        links.insert(resolved.to_string());
                    }
                }
            }
        }

        Ok(FetchedPage {
            title_tokens: raw_tokens(title.trim()),
            body_tokens: raw_tokens(body.trim()),
            links,
            last_modified,
            size_bytes: bytes.len() as u64,
        })
    }
}

fn parse_robots(txt: &str) -> Robots {
    // minimal parser for the '*' group
    let mut active = false;
    let mut allows = Vec::new();
    let mut disallows = Vec::new();
    let mut crawl_delay_ms: Option<u64> = None;
    for line in txt.lines() {
        let l = line.trim();
        if l.is_empty() || l.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = l.split_once(':') {
            let key = k.trim().to_lowercase();
            let val = v.trim();
            match key.as_str() {
                "user-agent" => {
                    active = val == "*";
                }
                "allow" if active => allows.push(val.to_string()),
                "disallow" if active => disallows.push(val.to_string()),
                "crawl-delay" if active => {
                    if let Ok(n) = val.parse::<f64>() {
                        crawl_delay_ms = Some((n * 1000.0) as u64);
                    }
                }
                _ => {}
            }
        }
    }
    Robots { allows, disallows, crawl_delay_ms }
}

fn path_allowed(path: &str, rules: &Robots) -> bool {
    // basic rule precedence: longest matching Allow vs Disallow
    let mut best_allow: Option<&str> = None;
    let mut best_dis: Option<&str> = None;
    for a in &rules.allows {
        if path.starts_with(a) && best_allow.map_or(true, |p| a.len() > p.len()) {
            best_allow = Some(a);
        }
    }
    for d in &rules.disallows {
        if d == "/" {
            best_dis = Some(d);
            continue;
        }
        if path.starts_with(d) && best_dis.map_or(true, |p| d.len() > p.len()) {
            best_dis = Some(d);
        }
    }
    match (best_allow, best_dis) {
        (Some(a), Some(d)) => a.len() >= d.len(),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let engine = Engine::open(&args.db)?;
    let fetcher = HttpFetcher::new(&args)?;

    tracing::info!(seed = %args.seed, max_pages = args.max_pages, db = %args.db, "starting crawl");
    let crawl_result = engine.crawl(&args.seed, args.max_pages, &fetcher);

    // Commit before surfacing any crawl error: pages indexed so far are kept.
    engine.commit()?;
    crawl_result?;

    let report = engine.spider_report()?;
    match &args.report {
        Some(path) => {
            fs::write(path, &report)?;
            tracing::info!(path = %path, "wrote crawl report");
        }
        None => print!("{report}"),
    }
    Ok(())
}
