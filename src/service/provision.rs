use tracing::{info, instrument};

use super::{
    address, render, step, ClientName, KeyPair, Provisioner, ServiceError, TunnelAddress,
};
use crate::access::join_path;

const CLIENT_PATTERN: &str = "*.conf";

impl Provisioner {
    fn client_path(&self, name: &ClientName) -> String {
        join_path(&self.clients_dir, &format!("{name}.conf"))
    }

    #[instrument(skip_all, fields(client = %name))]
    pub async fn name_exists(&self, name: &ClientName) -> Result<bool, ServiceError> {
        Ok(self.access.file_exists(&self.client_path(name)).await?)
    }

    /// Creates a client, registers it with the server and returns its config.
    ///
    /// Nothing is rolled back on failure: a client file or peer entry written
    /// before the failing step stays on the server.
    #[instrument(skip_all, fields(client = %name))]
    pub async fn provision(&self, name: &ClientName) -> Result<String, ServiceError> {
        let keys = KeyPair::generate();

        let _ledger = self.ledger.lock().await;

        let client_path = self.client_path(name);
        if self
            .access
            .file_exists(&client_path)
            .await
            .map_err(step("check client config"))?
        {
            return Err(ServiceError::NameCollision(name.clone()));
        }

        let address = self.allocate().await?;
        let config = render::client_config(&keys, &address, &self.server);

        self.access
            .write_file(&client_path, &config)
            .await
            .map_err(step("write client config"))?;
        self.access
            .append_file(
                &self.server_config,
                &render::peer_entry(name, &keys.public_key, &address),
            )
            .await
            .map_err(step("register peer"))?;
        self.reload().await?;

        info!(
            "provisioned {name} as host {host} ({ipv4}) with key {key}",
            host = address.host(),
            ipv4 = address.ipv4(),
            key = keys.public_key
        );
        Ok(config)
    }

    async fn allocate(&self) -> Result<TunnelAddress, ServiceError> {
        let files = self
            .access
            .list_files(&self.clients_dir, CLIENT_PATTERN)
            .await
            .map_err(step("list client configs"))?;

        let mut ledger = Vec::with_capacity(files.len());
        for file in files {
            // a file removed since listing holds no address
            if let Some(config) = self
                .access
                .read_file(&file)
                .await
                .map_err(step("read client config"))?
            {
                ledger.push(config);
            }
        }

        address::allocate_next(ledger.iter().map(String::as_str))
            .ok_or(ServiceError::AddressSpaceExhausted)
    }
}
