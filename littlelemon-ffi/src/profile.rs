//! FFI bindings for profile preferences and onboarding.

use crate::{read_cstr, with_handle, write_json, LittleLemonError};
use littlelemon_storage::{validate_onboarding, Profile};
use serde::Serialize;
use std::ffi::c_char;
use tracing::{info, warn};

#[derive(Serialize)]
struct ProfileDto {
    #[serde(flatten)]
    profile: Profile,
    initials: String,
    onboarded: bool,
}

/// Loads the saved profile; missing fields come back empty.
///
/// # Safety
/// - `out_json` must be a valid pointer.
/// - The returned string must be freed with `littlelemon_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_profile_load(out_json: *mut *mut c_char) -> LittleLemonError { unsafe {
    if out_json.is_null() {
        return LittleLemonError::NullPointer;
    }
    with_handle(|h| {
        let profile = match h.profile_store.load() {
            Ok(p) => p,
            Err(e) => return (&e).into(),
        };
        let onboarded = match h.profile_store.is_onboarded() {
            Ok(b) => b,
            Err(e) => return (&e).into(),
        };
        let dto = ProfileDto {
            initials: profile.initials(),
            profile,
            onboarded,
        };
        write_json(&dto, out_json)
    })
}}

/// Saves the profile. An absent or null `avatar` keeps the stored one.
///
/// # Safety
/// - `profile_json` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_profile_save(profile_json: *const c_char) -> LittleLemonError { unsafe {
    let json = match read_cstr(profile_json) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let profile: Profile = match serde_json::from_str(json) {
        Ok(p) => p,
        Err(e) => {
            warn!("invalid profile json: {e}");
            return LittleLemonError::JsonError;
        }
    };
    with_handle(|h| match h.profile_store.save(&profile) {
        Ok(()) => LittleLemonError::Ok,
        Err(e) => (&e).into(),
    })
}}

/// Removes every saved preference (logout).
#[unsafe(no_mangle)]
pub extern "C" fn littlelemon_profile_clear() -> LittleLemonError {
    with_handle(|h| match h.profile_store.clear() {
        Ok(()) => {
            info!("profile cleared");
            LittleLemonError::Ok
        }
        Err(e) => (&e).into(),
    })
}

/// Returns whether onboarding has been completed. False if not initialized.
#[unsafe(no_mangle)]
pub extern "C" fn littlelemon_profile_is_onboarded() -> bool {
    let handle = crate::lock_handle();
    match handle.as_ref() {
        Some(h) => h.profile_store.is_onboarded().unwrap_or_else(|e| {
            warn!("onboarding check failed: {e}");
            false
        }),
        None => false,
    }
}

/// Validates the onboarding form. Does not need the runtime.
///
/// # Safety
/// - `first_name` and `email` must be valid null-terminated UTF-8 strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_onboarding_validate(
    first_name: *const c_char,
    email: *const c_char,
) -> LittleLemonError { unsafe {
    let first_name = match read_cstr(first_name) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let email = match read_cstr(email) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match validate_onboarding(first_name, email) {
        Ok(()) => LittleLemonError::Ok,
        Err(e) => e.into(),
    }
}}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::littlelemon_shutdown;
    use crate::tests::{take_json, test_init};
    use serial_test::serial;
    use std::ffi::CString;
    use std::ptr;

    fn load() -> serde_json::Value {
        let mut out = ptr::null_mut();
        assert_eq!(unsafe { littlelemon_profile_load(&mut out) }, LittleLemonError::Ok);
        take_json(out)
    }

    fn save(json: &str) -> LittleLemonError {
        let json = CString::new(json).unwrap();
        unsafe { littlelemon_profile_save(json.as_ptr()) }
    }

    #[test]
    #[serial]
    fn save_load_clear() {
        assert_eq!(test_init(), LittleLemonError::Ok);
        assert!(!littlelemon_profile_is_onboarded());
        assert_eq!(load()["onboarded"], false);

        let result = save(
            r#"{"first_name":"Tilly","last_name":"Doe","email":"tilly@littlelemon.com","phone":"",
                "notifications":{"order_statuses":true,"password_changes":true,"special_offers":false,"newsletter":true}}"#,
        );
        assert_eq!(result, LittleLemonError::Ok);

        let profile = load();
        assert_eq!(profile["first_name"], "Tilly");
        assert_eq!(profile["initials"], "TD");
        assert_eq!(profile["onboarded"], true);
        assert_eq!(profile["notifications"]["newsletter"], true);
        assert!(littlelemon_profile_is_onboarded());

        assert_eq!(littlelemon_profile_clear(), LittleLemonError::Ok);
        assert_eq!(load()["first_name"], "");
        assert!(!littlelemon_profile_is_onboarded());
        littlelemon_shutdown();
    }

    #[test]
    #[serial]
    fn save_rejects_bad_json() {
        assert_eq!(test_init(), LittleLemonError::Ok);
        assert_eq!(save("{\"first_name\": 3}"), LittleLemonError::JsonError);
        littlelemon_shutdown();
    }

    #[test]
    #[serial]
    fn profile_calls_need_init() {
        littlelemon_shutdown();
        assert_eq!(littlelemon_profile_clear(), LittleLemonError::NotInitialized);
        assert!(!littlelemon_profile_is_onboarded());
    }

    #[test]
    fn onboarding_validation_codes() {
        let validate = |first: &str, email: &str| {
            let first = CString::new(first).unwrap();
            let email = CString::new(email).unwrap();
            unsafe { littlelemon_onboarding_validate(first.as_ptr(), email.as_ptr()) }
        };
        assert_eq!(validate("Tilly", "tilly@littlelemon.com"), LittleLemonError::Ok);
        assert_eq!(validate("Tilly2", "tilly@littlelemon.com"), LittleLemonError::InvalidFirstName);
        assert_eq!(validate("Tilly", "tilly@lemon"), LittleLemonError::InvalidEmail);
        assert_eq!(
            unsafe { littlelemon_onboarding_validate(ptr::null(), ptr::null()) },
            LittleLemonError::NullPointer
        );
    }
}
