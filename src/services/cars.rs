//! Car records service: CRUD, media files and exports

use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, SecondsFormat, Utc};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::UploadsConfig,
    error::{AppError, AppResult},
    models::car::{parse_date_bound, Car, CarExportRow, CarForm, CarQuery, RecordScope},
    repository::{cars::DateBounds, Repository},
};

/// URL prefix media files are served under
pub const MEDIA_URL_PREFIX: &str = "/uploads/";

/// A file received in a multipart form
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

/// Resolve listing bounds. A date-only `endDate` covers the whole day.
pub fn resolve_bounds(query: &CarQuery) -> AppResult<DateBounds> {
    let start = query
        .start_date
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(parse_date_bound)
        .transpose()?;

    let end = match query.end_date.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(value) => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(day) => Some(end_of_day(day)?),
            Err(_) => Some(parse_date_bound(value)?),
        },
    };

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AppError::Validation("startDate must not be after endDate".to_string()));
        }
    }

    Ok(DateBounds { start, end })
}

fn end_of_day(day: NaiveDate) -> AppResult<DateTime<Utc>> {
    day.checked_add_days(Days::new(1))
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc() - chrono::Duration::microseconds(1))
        .ok_or_else(|| AppError::Validation(format!("Invalid date: {}", day)))
}

/// Content-addressed file name: sha256 of the bytes plus the original extension
pub fn media_file_name(upload: &MediaUpload) -> String {
    let digest = hex::encode(Sha256::digest(&upload.data));
    let extension = upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{}", digest, ext),
        None => digest,
    }
}

/// Media files on local disk
#[derive(Clone)]
pub struct MediaStore {
    dir: PathBuf,
    max_file_size: usize,
}

impl MediaStore {
    pub fn new(config: &UploadsConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            max_file_size: config.max_file_size,
        }
    }

    /// Write a file and return its public URL path
    pub async fn save(&self, upload: &MediaUpload) -> AppResult<String> {
        if upload.data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if upload.data.len() > self.max_file_size {
            return Err(AppError::Validation(format!(
                "File exceeds maximum size of {} bytes",
                self.max_file_size
            )));
        }

        let name = media_file_name(upload);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;

        let path = self.dir.join(&name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::write(&path, &upload.data)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to save file: {}", e)))?;
        }

        tracing::debug!(file = %name, size = upload.data.len(), "Stored media file");
        Ok(format!("{}{}", MEDIA_URL_PREFIX, name))
    }

    /// On-disk path for a public URL path, if it points into the upload directory
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(MEDIA_URL_PREFIX)?;
        let file_name = Path::new(name).file_name()?;
        if file_name != name {
            return None;
        }
        Some(self.dir.join(file_name))
    }

    /// Remove a file; missing files are not an error
    pub async fn remove(&self, url: &str) {
        let Some(path) = self.local_path(url) else {
            tracing::warn!(url, "Refusing to delete media outside the upload directory");
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(url, "Removed media file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(url, error = %e, "Failed to remove media file"),
        }
    }
}

/// Column headers of the inventory workbook
pub const EXPORT_COLUMNS: [&str; 16] = [
    "Registration Number",
    "Make",
    "Model",
    "Variant",
    "Year",
    "Colour",
    "KMP",
    "Person Name",
    "Cell Number",
    "Price",
    "Referral ID",
    "In/Out Status",
    "In/Out Date Time",
    "Created By",
    "Created At",
    "Updated At",
];

const YEAR_COLUMN: usize = 4;

/// Media type of the exported workbook
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// One export row as text, in `EXPORT_COLUMNS` order
pub fn export_record(row: &CarExportRow) -> [String; 16] {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let timestamp = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
    let car = &row.car;

    [
        car.reg_no.clone(),
        text(&car.make),
        text(&car.model),
        text(&car.variant),
        car.year.map(|y| y.to_string()).unwrap_or_default(),
        text(&car.colour),
        text(&car.kmp),
        text(&car.person_name),
        text(&car.cell_no),
        text(&car.price),
        text(&car.referral_id),
        car.in_out_status.to_string(),
        timestamp(&car.in_out_date_time),
        text(&row.created_by_name),
        timestamp(&car.created_at),
        timestamp(&car.updated_at),
    ]
}

fn xlsx_error(e: XlsxError) -> AppError {
    AppError::Internal(format!("Failed to write export: {}", e))
}

/// Render the inventory workbook: a bold header row, then one row per car
pub fn export_xlsx(rows: &[CarExportRow]) -> AppResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Cars").map_err(xlsx_error)?;

    for (col, title) in (0u16..).zip(EXPORT_COLUMNS) {
        sheet
            .write_string_with_format(0, col, title, &header)
            .map_err(xlsx_error)?;
        sheet.set_column_width(col, 18).map_err(xlsx_error)?;
    }

    for (row_num, row) in (1u32..).zip(rows) {
        for (col, value) in (0u16..).zip(export_record(row)) {
            match row.car.year {
                Some(year) if col as usize == YEAR_COLUMN => {
                    sheet.write_number(row_num, col, f64::from(year)).map_err(xlsx_error)?;
                }
                _ if value.is_empty() => {}
                _ => {
                    sheet.write_string(row_num, col, value.as_str()).map_err(xlsx_error)?;
                }
            }
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("car_inventory_{}.xlsx", today.format("%Y-%m-%d"))
}

#[derive(Clone)]
pub struct CarsService {
    repository: Repository,
    media: MediaStore,
}

impl CarsService {
    pub fn new(repository: Repository, media: MediaStore) -> Self {
        Self { repository, media }
    }

    pub async fn list(&self, scope: &RecordScope, query: &CarQuery) -> AppResult<(Vec<Car>, i64)> {
        let bounds = resolve_bounds(query)?;
        self.repository.cars.search(scope, query, &bounds).await
    }

    pub async fn get(&self, scope: &RecordScope, id: Uuid) -> AppResult<Car> {
        self.repository.cars.get_by_id(scope, id).await
    }

    /// Create a car. Restricted callers get their own referral id by default.
    pub async fn create(
        &self,
        scope: &RecordScope,
        created_by: Uuid,
        mut form: CarForm,
        photos: Vec<MediaUpload>,
        video: Option<MediaUpload>,
    ) -> AppResult<Car> {
        if let RecordScope::Referral(referral_id) = scope {
            if form.referral_id.as_deref().map_or(true, str::is_empty) {
                form.referral_id = Some(referral_id.clone());
            }
        }

        let (photo_urls, video_url) = self.save_media(&photos, video.as_ref()).await?;

        match self
            .repository
            .cars
            .create(&form, &photo_urls, video_url.as_deref(), created_by)
            .await
        {
            Ok(car) => {
                tracing::info!(car_id = %car.id, reg_no = %car.reg_no, %created_by, "Car created");
                Ok(car)
            }
            Err(e) => {
                self.release(photo_urls.iter().chain(video_url.iter())).await;
                Err(e)
            }
        }
    }

    /// Update a car in scope. New photos replace all old ones; a new video replaces the old one.
    pub async fn update(
        &self,
        scope: &RecordScope,
        id: Uuid,
        form: CarForm,
        photos: Vec<MediaUpload>,
        video: Option<MediaUpload>,
    ) -> AppResult<Car> {
        let existing = self.repository.cars.get_by_id(scope, id).await?;

        let (photo_urls, video_url) = self.save_media(&photos, video.as_ref()).await?;
        let new_photos = (!photos.is_empty()).then_some(photo_urls.as_slice());

        let updated = match self
            .repository
            .cars
            .update(id, &form, new_photos, video_url.as_deref())
            .await
        {
            Ok(car) => car,
            Err(e) => {
                self.release(photo_urls.iter().chain(video_url.iter())).await;
                return Err(e);
            }
        };

        let mut replaced: Vec<&String> = Vec::new();
        if new_photos.is_some() {
            replaced.extend(existing.photos.iter().filter(|p| !updated.photos.contains(p)));
        }
        if video_url.is_some() {
            replaced.extend(existing.video.iter().filter(|v| updated.video.as_ref() != Some(*v)));
        }
        self.release(replaced).await;

        tracing::info!(car_id = %id, "Car updated");
        Ok(updated)
    }

    /// Delete a car in scope along with its media
    pub async fn delete(&self, scope: &RecordScope, id: Uuid) -> AppResult<()> {
        let existing = self.repository.cars.get_by_id(scope, id).await?;
        self.repository.cars.delete(id).await?;
        self.release(existing.photos.iter().chain(existing.video.iter())).await;

        tracing::info!(car_id = %id, reg_no = %existing.reg_no, "Car deleted");
        Ok(())
    }

    /// Workbook of every record with its creator's name
    pub async fn export(&self) -> AppResult<(String, Vec<u8>)> {
        let rows = self.repository.cars.export_rows().await?;
        let body = export_xlsx(&rows)?;
        tracing::info!(rows = rows.len(), "Exported car inventory");
        Ok((export_file_name(Utc::now().date_naive()), body))
    }

    async fn save_media(
        &self,
        photos: &[MediaUpload],
        video: Option<&MediaUpload>,
    ) -> AppResult<(Vec<String>, Option<String>)> {
        let mut saved = Vec::with_capacity(photos.len() + 1);
        for upload in photos.iter().chain(video) {
            match self.media.save(upload).await {
                Ok(url) => saved.push(url),
                Err(e) => {
                    self.release(saved.iter()).await;
                    return Err(e);
                }
            }
        }

        let video_url = match video {
            Some(_) => saved.pop(),
            None => None,
        };
        Ok((saved, video_url))
    }

    /// Delete files no car references any more
    async fn release<'a>(&self, urls: impl IntoIterator<Item = &'a String>) {
        let urls: Vec<&'a String> = urls.into_iter().collect();
        for url in urls {
            match self.repository.cars.media_in_use(url).await {
                Ok(false) => self.media.remove(url).await,
                Ok(true) => {}
                Err(e) => tracing::warn!(url = %url, error = %e, "Could not check media usage, keeping file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::car::InOutStatus;

    fn upload(name: Option<&str>, data: &[u8]) -> MediaUpload {
        MediaUpload {
            file_name: name.map(str::to_string),
            data: data.to_vec(),
        }
    }

    fn store(dir: &Path, max_file_size: usize) -> MediaStore {
        MediaStore::new(&UploadsConfig {
            dir: dir.to_string_lossy().into_owned(),
            max_file_size,
        })
    }

    #[test]
    fn test_media_file_name() {
        let sha_of_abc = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(media_file_name(&upload(Some("Front.JPG"), b"abc")), format!("{}.jpg", sha_of_abc));
        assert_eq!(media_file_name(&upload(None, b"abc")), sha_of_abc);
        assert_eq!(media_file_name(&upload(Some("x.ph p"), b"abc")), sha_of_abc);
    }

    #[test]
    fn test_local_path_stays_in_upload_dir() {
        let media = store(Path::new("uploads"), 10);
        assert_eq!(media.local_path("/uploads/abc.jpg"), Some(PathBuf::from("uploads/abc.jpg")));
        assert_eq!(media.local_path("/uploads/../secret"), None);
        assert_eq!(media.local_path("/etc/passwd"), None);
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = std::env::temp_dir().join(format!("car-portal-media-{}", Uuid::new_v4()));
        let media = store(&dir, 8);

        let url = media.save(&upload(Some("a.png"), b"pixels")).await.unwrap();
        assert!(url.starts_with(MEDIA_URL_PREFIX) && url.ends_with(".png"));
        let path = media.local_path(&url).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"pixels");

        assert!(matches!(
            media.save(&upload(None, b"far too large")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(media.save(&upload(None, b"")).await, Err(AppError::Validation(_))));

        media.remove(&url).await;
        assert!(!path.exists());
        media.remove(&url).await;

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn test_resolve_bounds() {
        let query = CarQuery {
            start_date: Some("2025-11-01".into()),
            end_date: Some("2025-11-20".into()),
            ..Default::default()
        };
        let bounds = resolve_bounds(&query).unwrap();
        assert_eq!(bounds.start.unwrap().to_rfc3339(), "2025-11-01T00:00:00+00:00");
        assert_eq!(
            bounds.end.unwrap().to_rfc3339_opts(SecondsFormat::Micros, true),
            "2025-11-20T23:59:59.999999Z"
        );

        let inverted = CarQuery {
            start_date: Some("2025-11-21".into()),
            end_date: Some("2025-11-20".into()),
            ..Default::default()
        };
        assert!(resolve_bounds(&inverted).is_err());
        assert!(resolve_bounds(&CarQuery::default()).unwrap().start.is_none());
    }

    fn export_row() -> CarExportRow {
        let at = parse_date_bound("2025-11-20T10:00:00Z").unwrap();
        CarExportRow {
            car: Car {
                id: Uuid::new_v4(),
                reg_no: "KA01AB1234".into(),
                make: Some("Maruti".into()),
                model: Some("Swift, VXi".into()),
                variant: None,
                year: Some(2019),
                colour: None,
                kmp: None,
                person_name: Some("Asha".into()),
                cell_no: None,
                price: Some("450000".into()),
                referral_id: Some("EMP042".into()),
                in_out_status: InOutStatus::Out,
                in_out_date_time: at,
                photos: Vec::new(),
                video: None,
                created_by: None,
                created_at: at,
                updated_at: at,
            },
            created_by_name: Some("Ravi Kumar".into()),
        }
    }

    #[test]
    fn test_export_record() {
        let record = export_record(&export_row());
        assert_eq!(record.len(), EXPORT_COLUMNS.len());
        assert_eq!(EXPORT_COLUMNS[YEAR_COLUMN], "Year");
        assert_eq!(
            record,
            [
                "KA01AB1234", "Maruti", "Swift, VXi", "", "2019", "", "", "Asha", "", "450000", "EMP042", "OUT",
                "2025-11-20T10:00:00Z", "Ravi Kumar", "2025-11-20T10:00:00Z", "2025-11-20T10:00:00Z",
            ]
            .map(String::from)
        );
    }

    #[test]
    fn test_export_xlsx_is_a_workbook() {
        let body = export_xlsx(&[export_row()]).unwrap();
        // XLSX is a zip container
        assert!(body.starts_with(b"PK\x03\x04"));

        let empty = export_xlsx(&[]).unwrap();
        assert!(empty.starts_with(b"PK\x03\x04"));
    }

    #[test]
    fn test_export_file_name() {
        let day = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        assert_eq!(export_file_name(day), "car_inventory_2025-11-20.xlsx");
    }
}
