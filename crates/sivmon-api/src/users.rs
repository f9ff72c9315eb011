use crate::client::SivClient;
use crate::error::Error;
use crate::models::UserRecord;

impl SivClient {
    /// `GET {prefix}/users/`
    pub async fn list_users(&self) -> Result<Vec<UserRecord>, Error> {
        self.get_json("/users/").await
    }
}
