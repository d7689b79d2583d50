use anyhow::{bail, Result};
use clap::Args;
use html_escape::encode_quoted_attribute;
use serde::Serialize;
use tracing::{debug, error, info};
use ureq::Agent;

use crate::offers::{self, Freebie};
use crate::store::{self, Region};

#[derive(Clone, Debug, Args)]
pub struct Config {
    #[arg(long, env = "TG_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,
    #[arg(long, env = "TG_CHAT_ID")]
    pub chat_id: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

pub fn run(agent: &Agent, config: &Config, region: &Region) {
    info!("Checking Epic free games (bilingual)...");
    let primary = store::fetch(agent, store::ENGLISH, region);
    let secondary = store::fetch(agent, store::CHINESE, region);
    let freebies = offers::bilingual(&primary, &secondary);

    if freebies.is_empty() {
        info!("No free games right now");
        return;
    }

    info!("Found {} free games", freebies.len());
    for freebie in &freebies {
        debug!("Sending {} ({})", freebie.title, freebie.id);
        send(agent, config, &render(freebie));
    }
}

/// Chat message with Telegram's HTML markup. The title may already carry `<br/>`.
pub fn render(freebie: &Freebie) -> String {
    format!(
        "<a href='{image}'>&#8205;</a>\
         🔥 <b>Epic 喜加一提醒</b> 🔥\n\n\
         🎮 <b>{title}</b>\n\
         ⏰ 截止: {end}\n\n\
         📝 {description}\n\n\
         🔗 <a href='{link}'>点击领取游戏</a>",
        image = freebie.image,
        title = freebie.title,
        end = freebie.end_date,
        description = encode_quoted_attribute(&freebie.description),
        link = freebie.link,
    )
}

pub fn send(agent: &Agent, config: &Config, text: &str) {
    if let Err(e) = try_send(agent, config, text) {
        error!("Failed to send Telegram message: {e:#}");
    }
}

fn try_send(agent: &Agent, config: &Config, text: &str) -> Result<()> {
    let (Some(token), Some(chat_id)) = (&config.bot_token, &config.chat_id) else {
        bail!("bot token or chat id not set");
    };

    let payload = SendMessage {
        chat_id: chat_id.as_str(),
        text,
        parse_mode: "HTML",
        disable_web_page_preview: false,
    };
    match agent
        .post(&format!("https://api.telegram.org/bot{token}/sendMessage"))
        .send_json(&payload)
    {
        Ok(_) => {
            info!("Sent Telegram message to {chat_id}");
            Ok(())
        }
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            bail!("Telegram responded {code}: {body}")
        }
        Err(e) => Err(e.into()),
    }
}
