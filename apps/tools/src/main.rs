use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{ItemId, UserId},
    protocol::{encode_item_ids, next_cache_buster, Action, ActionRequest},
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/wardrobe.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateUser {
        username: String,
        password: String,
    },
    ListItems {
        user_id: String,
    },
    /// Prints the page URL that triggers an action, e.g.
    /// `action-url weather -p city=Osaka`.
    ActionUrl {
        action: String,
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        #[arg(long = "item-id")]
        item_ids: Vec<String>,
        #[arg(long, default_value = "http://127.0.0.1:8501/")]
        base: String,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn action_url(base: &str, action: &str, params: Vec<(String, String)>, item_ids: Vec<String>) -> Result<String> {
    let action: Action = action.parse()?;
    let mut params: HashMap<String, String> = params.into_iter().collect();
    if !item_ids.is_empty() {
        if action != Action::BatchDelete {
            bail!("--item-id only applies to batch_delete");
        }
        let ids: Vec<ItemId> = item_ids.into_iter().map(ItemId::from).collect();
        params.insert("item_ids".into(), encode_item_ids(&ids));
    }
    let request = ActionRequest::decode(action, &params)?;
    Ok(format!("{base}?{}", request.to_query(next_cache_buster())))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::CreateUser { username, password } => {
            let storage = Storage::new(&cli.database_url).await?;
            if storage.username_exists(&username).await? {
                bail!("username '{username}' already exists");
            }
            let user_id = storage.create_user(&username, &password).await?;
            println!("created user_id={user_id}");
        }
        Command::ListItems { user_id } => {
            let storage = Storage::new(&cli.database_url).await?;
            let items = storage
                .list_items_for_user(&UserId::from(user_id))
                .await
                .context("failed to list wardrobe")?;
            for item in &items {
                println!(
                    "{}\t{}\t{}\t{}\twarmth={}",
                    item.item_id, item.name, item.category, item.color, item.warmth
                );
            }
            println!("{} item(s)", items.len());
        }
        Command::ActionUrl {
            action,
            params,
            item_ids,
            base,
        } => {
            println!("{}", action_url(&base, &action, params, item_ids)?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
