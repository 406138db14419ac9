use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use recall_core::config::Settings;
use recall_core::store::redis_store::RedisStore;
use recall_core::web::{HttpFetcher, PageCache};
use recall_core::{Cache, Value};
use recall_docstore::log_stats::{LogStats, top_ips};
use recall_docstore::store::DocumentStore;
use recall_docstore::store::in_memory_store::InMemoryDocumentStore;
use recall_docstore::store::mongo_store::MongoDocumentStore;
use tracing::{error, info};

mod cmdline;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = cmdline::root_cli().get_matches();
    let env_vars: HashMap<String, String> = env::vars().collect();
    let settings: Settings = env_vars.try_into()?;

    match cli.subcommand() {
        Some(("store", args)) => store(&settings, args).await,
        Some(("get", args)) => get(&settings, args).await,
        Some(("replay", args)) => replay(&settings, args).await,
        Some(("fetch", args)) => fetch(&settings, args).await,
        Some(("log-stats", args)) => log_stats(&settings, args).await,
        _ => Err("unknown subcommand".into()),
    }
}

async fn open_cache(settings: &Settings) -> Result<Cache<RedisStore>, Box<dyn Error>> {
    let store = RedisStore::new(&settings.redis).await?;
    Ok(Cache::open(store, &settings.cache).await?)
}

fn required<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a String, Box<dyn Error>> {
    args.get_one::<String>(id)
        .ok_or_else(|| format!("missing argument <{id}>").into())
}

async fn store(settings: &Settings, args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let data = required(args, "data")?;
    let cache = open_cache(settings).await?;
    let key = cache.store(data.as_str()).await?;
    println!("{key}");
    Ok(())
}

async fn get(settings: &Settings, args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let key = required(args, "key")?;
    let decode = required(args, "as")?;
    let cache = open_cache(settings).await?;

    let rendered = match decode.as_str() {
        cmdline::GET_AS_TEXT => cache.get_as_text(key).await?,
        cmdline::GET_AS_INT => cache.get_as_integer(key).await?.map(|n| n.to_string()),
        _ => cache.get(key).await?.map(|value| match value {
            Value::Integer(n) => n.to_string(),
            Value::Bytes(raw) => format!("{raw:?}"),
        }),
    };

    match rendered {
        Some(value) => println!("{value}"),
        None => println!("(nil)"),
    }
    Ok(())
}

async fn replay(settings: &Settings, args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let name = required(args, "name")?;
    let store = RedisStore::new(&settings.redis).await?;
    let history = recall_core::replay::replay(&store, name).await?;
    println!("{history}");
    Ok(())
}

async fn fetch(settings: &Settings, args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let url = required(args, "url")?;
    let store = RedisStore::new(&settings.redis).await?;
    let fetcher = HttpFetcher::new(&settings.web)?;
    let pages = PageCache::new(store, fetcher, &settings.web);

    match pages.get_page(url).await? {
        Some(text) => {
            println!("{text}");
            Ok(())
        }
        None => Err(format!("failed to fetch content for {url}").into()),
    }
}

/// Loads one JSON document per non-empty line into an in-memory collection.
async fn load_logs(path: &Path) -> Result<InMemoryDocumentStore, Box<dyn Error>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("reading {}: {e}", path.display()))?;
    let logs = InMemoryDocumentStore::new("nginx");

    for (n, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str(line)
            .map_err(|e| format!("parsing {} line {}: {e}", path.display(), n + 1))?;
        logs.insert_one(document).await?;
    }

    info!(path = %path.display(), documents = logs.len(), "Loaded logs");
    Ok(logs)
}

async fn report<D: DocumentStore>(logs: &D, top: Option<usize>) -> Result<(), Box<dyn Error>> {
    println!("{}", LogStats::collect(logs).await?);

    if let Some(limit) = top {
        println!("IPs:");
        for row in top_ips(logs, limit).await? {
            println!("\t{}: {}", row.ip, row.count);
        }
    }
    Ok(())
}

async fn log_stats(settings: &Settings, args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let top = args.get_one::<usize>("top-ips").copied();

    match args.get_one::<PathBuf>("file") {
        Some(path) => report(&load_logs(path).await?, top).await,
        None => {
            let mongo = &settings.mongo;
            let logs =
                MongoDocumentStore::connect(&mongo.url, &mongo.database, &mongo.collection)
                    .await?;
            report(&logs, top).await
        }
    }
}
