mod api;
mod cache;
mod config;
mod logging;
mod store;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use api::client::RestClient;
use api::retry::RetryPolicy;
use api::types::{CartItem, Product};
use cache::{
  CacheKey, DataSource, KeyValueStorage, MemoryStorage, OfflineCache, PreloadStatus, SqliteStorage,
};
use store::cart::QuantityOutcome;
use store::products::{ProductFilters, ProductQuery};
use store::{pricing, Remote, Store, SyncError};

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Offline-first command line client for the shop backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Never touch the network; serve everything from the cache
  #[arg(long)]
  offline: bool,

  /// Retry transient read failures with exponential backoff
  #[arg(long)]
  retry: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List products
  Products {
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Number of pages to load, appended in order
    #[arg(long, default_value_t = 1)]
    pages: u32,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<u64>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    in_stock: bool,
  },
  /// List categories
  Categories,
  /// Featured, new, best-selling and discounted products
  Highlights,
  /// Show the signed-in user
  Profile,
  /// Inspect or change the cart
  Cart {
    #[command(subcommand)]
    action: Option<CartAction>,
  },
  /// Fetch everything worth having offline into the cache
  Preload,
  /// Manage the offline cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CartAction {
  Show,
  /// Add a product (kg for weight-sold products)
  Add {
    product_id: u64,
    #[arg(default_value_t = 1.0)]
    quantity: f64,
  },
  Set {
    item_id: u64,
    quantity: f64,
  },
  Inc {
    item_id: u64,
  },
  Dec {
    item_id: u64,
  },
  Remove {
    item_id: u64,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Drop cached data (all keys unless one is given)
  Clear {
    #[arg(long, value_enum)]
    key: Option<KeyArg>,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyArg {
  Products,
  Categories,
  UserProfile,
  Cart,
}

impl From<KeyArg> for CacheKey {
  fn from(key: KeyArg) -> Self {
    match key {
      KeyArg::Products => CacheKey::Products,
      KeyArg::Categories => CacheKey::Categories,
      KeyArg::UserProfile => CacheKey::UserProfile,
      KeyArg::Cart => CacheKey::Cart,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init()?;

  let client = RestClient::new(&config)?;
  if args.offline {
    client.set_offline(true);
  }
  let mut remote = Remote::new(Arc::new(client));
  if args.retry {
    remote = remote.with_retry(RetryPolicy::default());
  }

  if config.cache.ephemeral {
    let cache = OfflineCache::new(MemoryStorage::new()).with_ttl(config.cache_ttl());
    let store = Store::new(remote, cache, &config.catalog);
    return run(store, args.command).await;
  }

  let storage = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  let cache = OfflineCache::new(storage).with_ttl(config.cache_ttl());
  let store = Store::new(remote, cache, &config.catalog);
  run(store, args.command).await
}

async fn run<S: KeyValueStorage>(
  mut store: Store<RestClient, S>,
  command: Command,
) -> Result<()> {
  match command {
    Command::Products {
      page,
      pages,
      search,
      category,
      brand,
      min_price,
      max_price,
      in_stock,
    } => {
      let query = ProductQuery {
        page: Some(page),
        search,
        filters: Some(ProductFilters {
          category,
          brand,
          min_price,
          max_price,
          in_stock: in_stock.then_some(true),
        }),
        append: false,
      };
      store.load_products(query).await.map_err(report)?;
      for _ in 1..pages {
        if !store.load_next_page().await.map_err(report)? {
          break;
        }
      }

      let list = &store.products;
      for product in &list.items {
        print_product(product);
      }
      println!(
        "\n{} shown, page {} of {} results{}",
        list.items.len(),
        list.pagination.page,
        list.pagination.total,
        source_note(list.source)
      );
    }
    Command::Categories => {
      store.load_categories().await.map_err(report)?;
      for category in &store.categories.items {
        let parent = category
          .parent
          .map(|p| format!(" (in {})", p))
          .unwrap_or_default();
        println!("{:>6}  {}{}", category.id, category.name, parent);
      }
      println!(
        "{} categories{}",
        store.categories.items.len(),
        source_note(store.categories.source)
      );
    }
    Command::Highlights => {
      let highlights = store.load_highlights().await;
      for (title, listing) in [
        ("Featured", highlights.featured),
        ("New arrivals", highlights.new_arrivals),
        ("Best sellers", highlights.best_sellers),
        ("On sale", highlights.on_sale),
      ] {
        println!("== {} ==", title);
        match listing {
          Ok(products) => products.iter().for_each(print_product),
          Err(e) => println!("  unavailable: {}", e),
        }
      }
    }
    Command::Profile => {
      let source = store.load_profile().await.map_err(report)?;
      if let Some(profile) = &store.profile {
        println!("{} <{}>", profile.display_name(), profile.email.as_deref().unwrap_or("-"));
        if let Some(phone) = &profile.phone {
          println!("phone: {}", phone);
        }
      }
      println!("source: {:?}", source);
    }
    Command::Cart { action } => {
      store.load_cart().await.map_err(report)?;
      let outcome = match action.unwrap_or(CartAction::Show) {
        CartAction::Show => None,
        CartAction::Add {
          product_id,
          quantity,
        } => {
          let product = store.load_product(product_id).await.map_err(report)?;
          Some(store.add_to_cart(&product, quantity).await)
        }
        CartAction::Set { item_id, quantity } => Some(store.set_quantity(item_id, quantity).await),
        CartAction::Inc { item_id } => Some(store.increment(item_id).await),
        CartAction::Dec { item_id } => Some(store.decrement(item_id).await),
        CartAction::Remove { item_id } => Some(store.remove_from_cart(item_id).await),
      };

      match outcome {
        Some(Ok(QuantityOutcome::Unchanged)) => println!("Nothing to change"),
        Some(Ok(_)) | None => {}
        Some(Err(e)) => println!("{}", e),
      }
      if let Some(notice) = store.cart.notice.take() {
        println!("{}", notice);
      }
      print_cart(&store);
    }
    Command::Preload => {
      let report = store.preload().await;
      for (name, status) in [
        ("products", &report.products),
        ("categories", &report.categories),
        ("profile", &report.profile),
        ("cart", &report.cart),
      ] {
        println!("{:<11} {}", name, preload_status(status));
      }
      println!("{} of 4 stored", report.stored());
    }
    Command::Cache {
      action: CacheAction::Clear { key },
    } => match key {
      Some(key) => {
        let key = CacheKey::from(key);
        store.evict(key);
        println!("Cleared {}", key);
      }
      None => {
        store.clear_cache();
        println!("Cache cleared");
      }
    },
  }

  Ok(())
}

fn report(e: SyncError) -> color_eyre::Report {
  eyre!("{}", e)
}

fn preload_status(status: &PreloadStatus) -> String {
  match status {
    PreloadStatus::Skipped => "skipped".to_string(),
    PreloadStatus::Stored => "stored".to_string(),
    PreloadStatus::Failed(reason) => format!("failed: {}", reason),
  }
}

fn source_note(source: DataSource) -> &'static str {
  match source {
    DataSource::Network => "",
    DataSource::Cache => " [cached: network request failed]",
    DataSource::Offline => " [offline]",
  }
}

fn print_product(product: &Product) {
  let price = pricing::product_unit_price(product);
  let unit = if product.sold_by_weight {
    format!("/{}", product.weight_unit.unwrap_or_default().label())
  } else {
    String::new()
  };
  let brand = product
    .brand
    .as_deref()
    .map(|b| format!(" [{}]", b))
    .unwrap_or_default();
  println!("{:>6}  {}{}  {:.2}{}", product.id, product.title, brand, price, unit);
}

fn print_cart<S: KeyValueStorage>(store: &Store<RestClient, S>) {
  let cart = &store.cart;
  if cart.lines.is_empty() {
    println!("Cart is empty{}", source_note(cart.source));
    return;
  }
  for line in &cart.lines {
    let item: &CartItem = &line.item;
    let quantity = if item.is_weight_based() {
      format!("{} {}", item.quantity, item.weight_unit().label())
    } else {
      format!("x{}", item.quantity)
    };
    println!(
      "{:>6}  {}  {}  {:.2}",
      item.id,
      item.product.title,
      quantity,
      pricing::line_total(item)
    );
  }
  println!(
    "{} items, subtotal {:.2}{}",
    cart.item_count(),
    cart.subtotal(),
    source_note(cart.source)
  );
}
