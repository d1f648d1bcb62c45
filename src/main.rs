use std::env;

use log::*;
use warp::Filter;
use warp::filters::log::Info;

use koperasi_api::db;

#[tokio::main]
async fn main() {
	env::set_var("RUST_LOG", "debug");
	pretty_env_logger::init();

	let pool = db::pg_connection();
	info!("database pool ready: {:?}", pool.state());

	let log = warp::log::custom(|info: Info| {
		info!(
			target: "koperasi::api",
			"\"{} {} {:?}\" \t{} {} {:?}",
			info.method(),
			info.path(),
			info.version(),
			info.status().canonical_reason().unwrap_or("-"),
			info.status().as_u16(),
			info.elapsed(),
		);
	});

	let health = warp::path("health").map(|| "ok");
	let root = warp::path::end().map(|| "Koperasi API");
	let routes = health.or(root).with(log);

	warp::serve(routes).run(([127, 0, 0, 1], 3030)).await;
}
