/*!
# Transaction Categorizer

Upload a spreadsheet of financial transactions, have every row labelled with
a spending category by a text-generation model, fix the result up in the
browser and push it to a Google Sheet.

## Flow

1. **Extract**: the uploaded workbook or CSV is sliced to the requested
   row and column span. Row 0 of the span is the header.
2. **Categorize**: each data row's description is sent to the classifier,
   with a bounded number of requests in flight. A `Category` column is
   appended; failures fall back to `Other`.
3. **Edit**: the categorized table lives in a per-session store. Cells,
   rows and columns can be edited and rows selected for bulk deletion.
4. **Export**: data rows are appended to a Google Sheet, or the whole table
   is downloaded as CSV or XLSX.

## Modules

- **table**: the nested-array table shared by every stage
- **range**, **loader**: range parsing and extraction from uploads
- **category**, **classifier**, **pipeline**: labels, the Gemini client and the
  concurrent categorization batch
- **editor**, **display**: the editable table and its browser view
- **sheets**, **oauth**: Google Sheets export and token handling
- **store**, **saving**: sessions and their gzip/bincode snapshots
- **downloader**: CSV and XLSX download
- **config**, **error**: environment configuration and error types
- **app**, **auth**: axum routes and the basic-auth gate (`web` feature)

## REST API

- `POST /api/upload` - multipart upload and categorization
- `GET|PUT|DELETE /api/table` - view, seed or clear the session table
- `POST /api/table/cell`, `/api/table/columns` - edits
- `DELETE /api/table/rows/{row}`, `/api/table/columns/{column}` - deletions
- `POST /api/table/selection/{row}` - selection toggle
- `POST /api/table/export`, `/api/sheets` - Google Sheets export
- `GET /api/table/download/{csv|xlsx}` - file download
*/

pub mod category;
pub mod classifier;
pub mod config;
pub mod display;
pub mod downloader;
pub mod editor;
pub mod error;
pub mod loader;
pub mod oauth;
pub mod pipeline;
pub mod range;
pub mod saving;
pub mod sheets;
pub mod store;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod auth;

pub use error::AppError;
pub use table::{Cell, Row, Table};
