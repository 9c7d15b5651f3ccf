use futures::stream::FuturesUnordered;

use crate::service::Provisioner;

pub mod telegram;

pub fn run(
    tg: telegram::Config,
    service: Provisioner,
) -> FuturesUnordered<tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>>
{
    let futures = FuturesUnordered::new();

    futures.push(tokio::spawn(telegram::start(tg, service)));

    futures
}
