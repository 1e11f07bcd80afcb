//! File upload and metadata feature.
//!
//! Content goes to object storage through a `StorageAdapter`, descriptive
//! records go to a `MetadataStore`. The upload service keeps the two in
//! step and compensates when the second write fails.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | POST | `/api/files` | Upload one file (multipart field `file`) |
//! | POST | `/api/files/batch` | Upload several files (`files[]`), 200 or 207 |
//! | GET | `/api/files` | Search, filter, sort and paginate |
//! | GET | `/api/files/stats` | Totals by MIME category and uploader |
//! | GET | `/api/files/{id}` | Get one file record |
//! | GET | `/api/files/{id}/download` | Redirect to public or signed URL |
//! | PUT | `/api/files/{id}` | Update tags, visibility, metadata |
//! | DELETE | `/api/files/{id}` | Delete content and record |

pub mod dtos;
pub mod form;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod validator;

pub use routes::routes;
