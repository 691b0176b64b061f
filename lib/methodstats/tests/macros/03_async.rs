use methodstats::method_stats;

struct Client;

impl Client {
	#[method_stats(action = "SEARCH")]
	async fn search(&self, #[tag("query")] query: String) -> Result<Vec<String>, String> {
		if query.is_empty() {
			return Err("empty query".to_string());
		}
		Ok(vec![query])
	}

	#[method_stats]
	async fn ping(&self) {}
}

fn main() {
	let client = Client;
	let results = tokio_test::block_on(client.search("rust".to_string()));
	assert_eq!(results, Ok(vec!["rust".to_string()]));
	tokio_test::block_on(client.ping());
}

