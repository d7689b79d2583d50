use std::{thread, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Args;
use html_escape::encode_quoted_attribute;
use itertools::Itertools;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use tracing::{debug, error, info, warn};
use ureq::Agent;

use crate::offers::{self, Freebie, DEFAULT_WINDOW_HOURS, MAX_WINDOW_HOURS, UNKNOWN};
use crate::store::{self, Region};

#[derive(Clone, Debug, Args)]
pub struct Config {
    /// Sending account, also used as the SMTP login
    #[arg(long, env = "MAIL_USER")]
    pub user: Option<String>,
    #[arg(long, env = "MAIL_PASS", hide_env_values = true)]
    pub pass: Option<String>,
    /// Comma separated recipient addresses
    #[arg(long, env = "MAIL_RECEIVERS", value_delimiter = ',')]
    pub receivers: Vec<String>,
    #[arg(long, env = "MAIL_HOST", default_value = "smtp.qq.com")]
    pub host: String,
    #[arg(long, env = "MAIL_PORT", default_value_t = 587)]
    pub port: u16,
    /// SMTP socket timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
    #[arg(long, default_value = store::CHINESE)]
    pub locale: String,
    /// Promotions that started longer ago than this are assumed to be already sent
    #[arg(
        long,
        default_value_t = DEFAULT_WINDOW_HOURS,
        value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_HOURS)
    )]
    pub window_hours: i64,
}

impl Config {
    fn receivers(&self) -> Vec<String> {
        self.receivers
            .iter()
            .map(|x| x.trim())
            .filter(|x| !x.is_empty())
            .map(|x| x.to_string())
            .collect()
    }
}

/// A rendered email, ready to go to any number of recipients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Letter {
    pub subject: String,
    pub html: String,
    pub plain: String,
}

pub trait Mailer {
    fn send(&self, to: &Mailbox, letter: &Letter) -> Result<()>;
}

pub struct SmtpMailer {
    from: Mailbox,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> Result<Self> {
        let (Some(user), Some(pass)) = (&config.user, &config.pass) else {
            bail!("mail user or password not set");
        };

        let transport = SmtpTransport::starttls_relay(&config.host)
            .with_context(|| format!("Failed to set up SMTP relay {}", config.host))?
            .port(config.port)
            .credentials(Credentials::new(user.clone(), pass.clone()))
            .timeout(Some(Duration::from_secs(config.timeout)))
            .build();

        Ok(Self {
            from: user.parse::<Mailbox>().context("Invalid sender address")?,
            transport,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &Mailbox, letter: &Letter) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(letter.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                letter.plain.clone(),
                letter.html.clone(),
            ))?;
        self.transport.send(&message)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Retry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

pub fn run(agent: &Agent, config: &Config, region: &Region, now: DateTime<Utc>) -> Result<()> {
    info!("Checking Epic free games (new in the last {}h)...", config.window_hours);
    let receivers = config.receivers();
    if receivers.is_empty() {
        bail!("no mail receivers set");
    }

    let elements = store::fetch(agent, &config.locale, region);
    let freebies = offers::recent(&elements, now, TimeDelta::hours(config.window_hours));
    if freebies.is_empty() {
        info!("No newly free games");
        return Ok(());
    }

    info!(
        "Found {} new free games: {}",
        freebies.len(),
        freebies.iter().map(|x| &x.title).join(", ")
    );
    let mailer = SmtpMailer::new(config)?;
    notify(&mailer, &receivers, &freebies, Retry::default());
    Ok(())
}

/// Mails every freebie to every receiver, returning how many messages went out.
pub fn notify(
    mailer: &impl Mailer,
    receivers: &[String],
    freebies: &[Freebie],
    retry: Retry,
) -> usize {
    let mut sent = 0;
    for freebie in freebies {
        debug!("Mailing {} ({})", freebie.title, freebie.id);
        let letter = letter(freebie);
        for to in receivers {
            if deliver(mailer, to, &letter, retry) {
                sent += 1;
            }
        }
    }
    sent
}

/// One recipient, retried with a fixed delay. Never fails the caller.
pub fn deliver(mailer: &impl Mailer, to: &str, letter: &Letter, retry: Retry) -> bool {
    // a malformed address fails the same way every time
    let mailbox = match to.parse::<Mailbox>() {
        Ok(x) => x,
        Err(e) => {
            error!("Skipping invalid recipient {to:?}: {e}");
            return false;
        }
    };

    for attempt in 1..=retry.attempts {
        match mailer.send(&mailbox, letter) {
            Ok(()) => {
                info!("Mailed {:?} to {to}", letter.subject);
                return true;
            }
            Err(e) if attempt < retry.attempts => {
                warn!("Attempt {attempt}/{} to {to} failed: {e:#}", retry.attempts);
                thread::sleep(retry.delay);
            }
            Err(e) => {
                error!("Giving up on {to} after {attempt} attempts: {e:#}");
            }
        }
    }
    false
}

pub fn letter(freebie: &Freebie) -> Letter {
    let title = encode_quoted_attribute(&freebie.title);
    let description = encode_quoted_attribute(&freebie.description);
    let start = encode_quoted_attribute(&freebie.start_date);
    let end = encode_quoted_attribute(&freebie.end_date);
    let elapsed = freebie.elapsed.map_or(UNKNOWN.to_string(), humanize);
    let link = encode_quoted_attribute(&freebie.link);
    let image = encode_quoted_attribute(&freebie.image);

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
<h2>🎮 {title}</h2>
<a href="{link}"><img src="{image}" alt="{title}" style="max-width: 100%;"></a>
<p>🚀 开始时间: {start}</p>
<p>⏰ 截止时间: {end}</p>
<p>🕒 已上架: {elapsed}</p>
<p>📝 {description}</p>
<p>🔗 <a href="{link}">点击领取游戏</a></p>
</body>
</html>
"#
    );

    let plain = format!(
        "{}\n截止时间: {}\n已上架: {elapsed}\n\n{}\n\n{}\n",
        freebie.title, freebie.end_date, freebie.description, freebie.link
    );

    Letter {
        subject: format!("Epic 喜加一: {}", freebie.title),
        html,
        plain,
    }
}

fn humanize(elapsed: TimeDelta) -> String {
    let minutes = elapsed.num_minutes();
    if minutes < 0 {
        return "尚未开始".to_string();
    }
    format!("{} 小时 {} 分钟", minutes / 60, minutes % 60)
}
