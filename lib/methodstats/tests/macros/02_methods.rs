use std::fmt::Display;

use methodstats::method_stats;

struct Inventory<T> {
	items: Vec<T>,
}

impl<T: Display + Clone> Inventory<T> {
	#[method_stats(action = "CREATE")]
	fn push(&mut self, #[tag("item")] item: T) {
		self.items.push(item);
	}

	#[method_stats(declaring_type = "Stock", count = false)]
	fn first(&self) -> Option<T> {
		self.items.first().cloned()
	}

	#[method_stats(fallible = false)]
	fn into_items(self) -> Vec<T> {
		self.items
	}
}

fn main() {
	let mut inventory = Inventory { items: Vec::new() };
	inventory.push("widget");
	assert_eq!(inventory.first(), Some("widget"));
	assert_eq!(inventory.into_items(), vec!["widget"]);
}
