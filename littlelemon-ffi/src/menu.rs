//! FFI bindings for the home screen menu.
//!
//! Immediate queries go straight to the cache; the browser functions drive
//! the shared filter state whose results are read back with
//! `littlelemon_menu_view`.

use crate::{read_cstr, with_handle, write_json, LittleLemonError};
use littlelemon_storage::{MenuFilter, MenuItem};
use littlelemon_sync::MenuView;
use serde::Serialize;
use std::ffi::c_char;
use tracing::warn;

/// Menu item as handed to the UI, with its image URL resolved.
#[derive(Serialize)]
struct MenuItemDto {
    id: i64,
    name: String,
    description: String,
    price: f64,
    image: String,
    category: String,
    image_url: Option<String>,
}

impl MenuItemDto {
    fn new(item: MenuItem, image_base_url: &str) -> Self {
        let image_url = item.image_url(image_base_url);
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
            price: item.price,
            image: item.image,
            category: item.category,
            image_url,
        }
    }
}

#[derive(Serialize)]
struct MenuViewDto {
    generation: u64,
    filter: MenuFilter,
    items: Vec<MenuItemDto>,
    pending_search: bool,
}

fn to_dtos(items: Vec<MenuItem>, image_base_url: &str) -> Vec<MenuItemDto> {
    items
        .into_iter()
        .map(|item| MenuItemDto::new(item, image_base_url))
        .collect()
}

/// Runs a filtered menu query immediately.
///
/// `request_json` is `{"categories": [...], "search": "..."}`; both fields
/// are optional.
///
/// # Safety
/// - `request_json` must be a valid null-terminated UTF-8 string.
/// - `out_json` must be a valid pointer.
/// - The returned string must be freed with `littlelemon_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_menu_query(
    request_json: *const c_char,
    out_json: *mut *mut c_char,
) -> LittleLemonError { unsafe {
    if out_json.is_null() {
        return LittleLemonError::NullPointer;
    }
    let request = match read_cstr(request_json) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let filter: MenuFilter = match serde_json::from_str(request) {
        Ok(f) => f,
        Err(e) => {
            warn!("invalid menu query: {e}");
            return LittleLemonError::JsonError;
        }
    };

    with_handle(|h| match h.query.query(&filter) {
        Ok(items) => write_json(&to_dtos(items, &h.config.image_base_url), out_json),
        Err(e) => (&e).into(),
    })
}}

/// Lists the category chips: categories in the cache, or the built-in list
/// while the cache is empty.
///
/// # Safety
/// - `out_json` must be a valid pointer.
/// - The returned string must be freed with `littlelemon_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_menu_categories(out_json: *mut *mut c_char) -> LittleLemonError { unsafe {
    if out_json.is_null() {
        return LittleLemonError::NullPointer;
    }
    with_handle(|h| match h.query.list_categories() {
        Ok(categories) => write_json(&categories, out_json),
        Err(e) => (&e).into(),
    })
}}

/// Selects or deselects a category chip; the view updates immediately.
///
/// # Safety
/// - `label` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_menu_toggle_category(label: *const c_char) -> LittleLemonError { unsafe {
    let label = match read_cstr(label) {
        Ok(s) => s,
        Err(e) => return e,
    };
    with_handle(|h| match h.browser.toggle_category(label) {
        Ok(_) => LittleLemonError::Ok,
        Err(e) => (&e).into(),
    })
}}

/// Updates the search text; the view updates once typing pauses.
///
/// # Safety
/// - `text` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_menu_set_search(text: *const c_char) -> LittleLemonError { unsafe {
    let text = match read_cstr(text) {
        Ok(s) => s,
        Err(e) => return e,
    };
    with_handle(|h| {
        h.browser.set_search_text(text);
        LittleLemonError::Ok
    })
}}

/// Gets the latest menu view.
///
/// # Safety
/// - `out_json` must be a valid pointer.
/// - The returned string must be freed with `littlelemon_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_menu_view(out_json: *mut *mut c_char) -> LittleLemonError { unsafe {
    if out_json.is_null() {
        return LittleLemonError::NullPointer;
    }
    with_handle(|h| {
        let MenuView {
            generation,
            filter,
            items,
        } = h.browser.view();
        let dto = MenuViewDto {
            generation,
            filter,
            items: to_dtos(items, &h.config.image_base_url),
            pending_search: h.browser.has_pending_search(),
        };
        write_json(&dto, out_json)
    })
}}
