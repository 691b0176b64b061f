use methodstats::method_stats;

#[method_stats]
fn add(a: u32, b: u32) -> u32 {
	a + b
}

#[method_stats(name = "parse_port", tags = "component,config", action = "READ", latency = false)]
fn parse_port(#[tag("input")] input: &str) -> Result<u16, std::num::ParseIntError> {
	let port = input.trim().parse()?;
	Ok(port)
}

fn main() {
	assert_eq!(add(1, 2), 3);
	assert_eq!(parse_port(" 8080 "), Ok(8080));
	assert!(parse_port("nope").is_err());
}
