use plaza_api_types::MAX_PAGE_SIZE;

use crate::application::error::AppError;

pub fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("`{field}` must not be empty")));
    }
    Ok(())
}

/// Pages start at 1; sizes run from 1 to [`MAX_PAGE_SIZE`].
pub fn validate_page(page: u32, size: u32) -> Result<(), AppError> {
    if page == 0 {
        return Err(AppError::validation("`page` starts at 1"));
    }
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(AppError::validation(format!(
            "`size` must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds() {
        assert!(validate_page(1, 1).is_ok());
        assert!(validate_page(3, MAX_PAGE_SIZE).is_ok());
        assert!(matches!(validate_page(0, 10), Err(AppError::Validation(_))));
        assert!(matches!(validate_page(1, 0), Err(AppError::Validation(_))));
        assert!(matches!(
            validate_page(1, MAX_PAGE_SIZE + 1),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(ensure_non_empty("  \n", "title").is_err());
        assert!(ensure_non_empty("hello", "title").is_ok());
    }
}
