use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ClientError;
use crate::domain::aggregates::CartItem;

/// Cart and wishlist kept on the shopper's device while signed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub cart: Vec<CartItem>,
    #[serde(default)]
    pub wishlist: Vec<Uuid>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl LocalState {
    /// Reads the state file; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file and renames it over `path`.
    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = temp_path(path);
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(self)?)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool { self.cart.is_empty() && self.wishlist.is_empty() }

    pub fn add_to_cart(&mut self, product_id: Uuid, quantity: u32) {
        if quantity == 0 { return; }
        match self.cart.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => item.quantity = item.quantity.saturating_add(quantity),
            None => self.cart.push(CartItem { product_id, quantity }),
        }
    }

    /// Zero drops the line.
    pub fn set_cart_quantity(&mut self, product_id: Uuid, quantity: u32) {
        if quantity == 0 {
            self.cart.retain(|i| i.product_id != product_id);
        } else if let Some(item) = self.cart.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity;
        }
    }

    /// Returns whether the product is listed afterwards.
    pub fn toggle_wishlist(&mut self, product_id: Uuid) -> bool {
        if let Some(pos) = self.wishlist.iter().position(|id| *id == product_id) {
            self.wishlist.remove(pos);
            false
        } else {
            self.wishlist.push(product_id);
            true
        }
    }
}
