use methodstats::method_stats;

#[method_stats]
fn evens(#[tag("limit")] limit: u32) -> impl Iterator<Item = u32> {
	(0..limit).filter(|n| n % 2 == 0)
}

#[method_stats(tags = "kind,borrowed")]
fn longest<'a>(a: &'a str, b: &'a str) -> &'a str {
	if a.len() >= b.len() {
		a
	} else {
		b
	}
}

fn main() {
	assert_eq!(evens(5).collect::<Vec<_>>(), vec![0, 2, 4]);
	assert_eq!(longest("abc", "de"), "abc");
}
