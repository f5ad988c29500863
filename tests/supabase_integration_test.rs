use taskify::supabase::{
    Filter, IdentityProvider, Order, SupabaseConfig, SupabaseHttpClient, Table, TableStore,
};

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored --test-threads=1
async fn test_list_own_todos_from_supabase() {
    // Needs SUPABASE_URL, SUPABASE_ANON_KEY and TASKIFY_TEST_ACCESS_TOKEN
    dotenvy::dotenv().ok();

    let config = SupabaseConfig::new_from_env().expect("Failed to load config");
    let client = SupabaseHttpClient::new(config).expect("Failed to create client");
    let token = std::env::var("TASKIFY_TEST_ACCESS_TOKEN").expect("TASKIFY_TEST_ACCESS_TOKEN is not set");

    let identity = client
        .resolve_session(&token)
        .await
        .expect("Failed to resolve session");
    println!("Signed in as {} ({:?})", identity.id, identity.email);

    let rows = client
        .select(
            &token,
            Table::Todos,
            &[Filter::eq("user_id", identity.id)],
            Some(Order::desc("created_at")),
        )
        .await
        .expect("Failed to list todos");

    println!("Fetched {} todos", rows.len());
    assert!(rows.iter().all(|row| row["user_id"] == serde_json::json!(identity.id)));
}
