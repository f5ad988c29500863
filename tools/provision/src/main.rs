use std::env;
use std::io::{self, Write};

use dotenvy::dotenv;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::json;

const MANAGEMENT_API: &str = "https://api.supabase.com/v1";

const SCHEMA_SQL: &str = r#"
create table if not exists public.categories (
  id uuid primary key default gen_random_uuid(),
  user_id uuid not null references auth.users (id) on delete cascade,
  name text not null,
  color text not null,
  created_at timestamptz not null default now()
);

create table if not exists public.todos (
  id uuid primary key default gen_random_uuid(),
  user_id uuid not null references auth.users (id) on delete cascade,
  task text not null check (length(trim(task)) > 0),
  description text,
  due_date date,
  priority smallint not null default 1 check (priority between 1 and 3),
  category uuid references public.categories (id) on delete set null,
  is_complete boolean not null default false,
  created_at timestamptz not null default now()
);

alter table public.categories enable row level security;
alter table public.todos enable row level security;

drop policy if exists "own categories" on public.categories;
create policy "own categories" on public.categories
  for all using (auth.uid() = user_id) with check (auth.uid() = user_id);

drop policy if exists "own todos" on public.todos;
create policy "own todos" on public.todos
  for all using (auth.uid() = user_id) with check (auth.uid() = user_id);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Schema,
    GoogleAuth,
}

#[derive(Debug, Serialize)]
struct AuthConfigPatch<'a> {
    external_google_enabled: bool,
    external_google_client_id: &'a str,
    external_google_secret: &'a str,
}

fn is_dry_run() -> bool {
    !env::args().any(|a| a == "--apply")
}

fn requested_steps(args: &[String]) -> Result<Vec<Step>, Box<dyn std::error::Error>> {
    let mut steps = Vec::new();
    for arg in args.iter().filter(|a| !a.starts_with("--")) {
        match arg.as_str() {
            "schema" => steps.push(Step::Schema),
            "google-auth" => steps.push(Step::GoogleAuth),
            other => return Err(format!("unknown step: {}", other).into()),
        }
    }
    if steps.is_empty() {
        steps = vec![Step::Schema, Step::GoogleAuth];
    }
    Ok(steps)
}

/// Reads `key` from the environment, falling back to an interactive prompt.
fn setting(key: &str, prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(value) = env::var(key).ok().filter(|v| !v.trim().is_empty()) {
        return Ok(value);
    }

    print!("{}: ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    let value = line.trim().to_string();
    if value.is_empty() {
        return Err(format!("{} is required", key).into());
    }
    Ok(value)
}

/// The project ref is the first label of the hosted project url.
fn project_ref(supabase_url: &str) -> Result<String, Box<dyn std::error::Error>> {
    let url = Url::parse(supabase_url)?;
    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("cannot read project ref from {}", supabase_url).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let steps = requested_steps(&args)?;
    let dry_run = is_dry_run();

    let supabase_url = setting("SUPABASE_URL", "Enter your Supabase URL")?
        .trim_end_matches('/')
        .to_string();
    let client = Client::new();

    for step in steps {
        match step {
            Step::Schema => {
                let service_key =
                    setting("SUPABASE_SERVICE_ROLE_KEY", "Enter your Supabase service_role key")?;
                apply_schema(&client, &supabase_url, &service_key, dry_run).await?;
            }
            Step::GoogleAuth => {
                println!("Create a Google OAuth web client with this redirect URI:");
                println!("  {}/auth/v1/callback", supabase_url);

                let access_token =
                    setting("SUPABASE_ACCESS_TOKEN", "Enter your Supabase personal access token")?;
                let client_id = setting("GOOGLE_CLIENT_ID", "Enter your Google Client ID")?;
                let client_secret =
                    setting("GOOGLE_CLIENT_SECRET", "Enter your Google Client Secret")?;

                let config = AuthConfigPatch {
                    external_google_enabled: true,
                    external_google_client_id: &client_id,
                    external_google_secret: &client_secret,
                };
                enable_google(&client, &supabase_url, &access_token, &config, dry_run).await?;
            }
        }
    }

    if dry_run {
        println!("Nothing was changed. Re-run with --apply to provision.");
    }

    Ok(())
}

async fn apply_schema(
    client: &Client,
    supabase_url: &str,
    service_key: &str,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/rest/v1/rpc/pgclient_exec", supabase_url);

    if dry_run {
        println!("[DRY RUN] Would POST schema to {}", url);
        println!("{}", SCHEMA_SQL);
        return Ok(());
    }

    client
        .post(&url)
        .header("apikey", service_key)
        .header("Authorization", format!("Bearer {}", service_key))
        .json(&json!({ "query": SCHEMA_SQL }))
        .send()
        .await?
        .error_for_status()?;

    println!("Schema applied: todos, categories and their row-level security policies");
    Ok(())
}

async fn enable_google(
    client: &Client,
    supabase_url: &str,
    access_token: &str,
    config: &AuthConfigPatch<'_>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/projects/{}/config/auth", MANAGEMENT_API, project_ref(supabase_url)?);

    if dry_run {
        println!(
            "[DRY RUN] Would PATCH {} enabling Google sign-in for client {}",
            url, config.external_google_client_id
        );
        return Ok(());
    }

    client
        .patch(&url)
        .header("Authorization", format!("Bearer {}", access_token))
        .json(config)
        .send()
        .await?
        .error_for_status()?;

    println!("Google sign-in enabled");
    Ok(())
}
