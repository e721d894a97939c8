// JNI bindings for com.audiowave.AudiowaveModule

use crate::bridge;
use crate::capi::AUDIOWAVE_DURATION_UNKNOWN;
use crate::registry::remove_session;
use audiowave_core::{AudioError, PlaybackMode, Result};
use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jfloat, jfloatArray, jint, jlong, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use std::path::PathBuf;

fn jstring_to_string(env: &mut JNIEnv, jstr: &JString) -> Result<String> {
    if jstr.is_null() {
        return Err(AudioError::InvalidState("Null string argument".into()));
    }
    let java_str = env
        .get_string(jstr)
        .map_err(|e| AudioError::InvalidState(e.to_string()))?;
    Ok(java_str.into())
}

fn to_code(result: Result<()>) -> jint {
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("JNI error: {}", err);
            err.code()
        }
    }
}

fn to_value(result: Result<i64>) -> jlong {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::error!("JNI error: {}", err);
            err.code() as jlong
        }
    }
}

/// Errors read as `false`; they are logged
fn to_jboolean(result: Result<bool>) -> jboolean {
    match result {
        Ok(true) => JNI_TRUE,
        Ok(false) => JNI_FALSE,
        Err(err) => {
            log::error!("JNI error: {}", err);
            JNI_FALSE
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeCreate(_env: JNIEnv, _class: JClass) -> jlong {
    to_value(bridge::create_player())
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeSetAssetRoot(
    mut env: JNIEnv,
    _class: JClass,
    path: JString,
) -> jint {
    if path.is_null() {
        bridge::set_asset_root(None);
        return 0;
    }
    to_code(jstring_to_string(&mut env, &path).map(|p| bridge::set_asset_root(Some(PathBuf::from(p)))))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeLoad(
    mut env: JNIEnv,
    _class: JClass,
    player_id: jlong,
    uri: JString,
    mode: jint,
) -> jint {
    to_code(jstring_to_string(&mut env, &uri).and_then(|uri| {
        let mode = PlaybackMode::from_code(mode)?;
        bridge::load(player_id, &uri, mode)
    }))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativePlayAudio(
    mut env: JNIEnv,
    _class: JClass,
    player_id: jlong,
    uri: JString,
) -> jint {
    to_code(jstring_to_string(&mut env, &uri).and_then(|uri| bridge::play_audio(player_id, &uri)))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativePlay(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(bridge::play(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativePause(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(bridge::pause(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeStop(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(bridge::stop(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeCancelLoad(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(bridge::cancel_load(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeSeek(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
    position_ms: jlong,
) -> jint {
    to_code(bridge::seek(player_id, position_ms.max(0) as u64))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeSetVolume(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
    volume: jfloat,
) -> jint {
    to_code(bridge::set_volume(player_id, volume))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeGetPosition(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jlong {
    to_value(bridge::position_ms(player_id).map(|ms| ms as i64))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeGetDuration(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jlong {
    to_value(bridge::duration_ms(player_id).map(|d| d.map(|ms| ms as i64).unwrap_or(AUDIOWAVE_DURATION_UNKNOWN)))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeIsPlaying(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jboolean {
    to_jboolean(bridge::is_playing(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeIsBuffering(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jboolean {
    to_jboolean(bridge::is_buffering(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeGetState(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_value(bridge::state_code(player_id).map(i64::from)) as jint
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeInterruptionBegan(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(bridge::interruption_began(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeInterruptionEnded(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(bridge::interruption_ended(player_id))
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeGetAudioDuration(
    mut env: JNIEnv,
    _class: JClass,
    uri: JString,
) -> jlong {
    to_value(jstring_to_string(&mut env, &uri).and_then(|uri| bridge::audio_duration_ms(&uri).map(|ms| ms as i64)))
}

/// Waveform points for `uri`, or null on failure
#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeGenerateWaveform(
    mut env: JNIEnv,
    _class: JClass,
    uri: JString,
    samples: jint,
) -> jfloatArray {
    let points = jstring_to_string(&mut env, &uri).and_then(|uri| {
        if samples < 0 {
            return Err(AudioError::InvalidState(format!("Invalid sample count {}", samples)));
        }
        bridge::waveform(&uri, samples as usize)
    });
    let points = match points {
        Ok(points) => points,
        Err(err) => {
            log::error!("JNI error: {}", err);
            return std::ptr::null_mut();
        }
    };

    let array = match env.new_float_array(points.len() as i32) {
        Ok(array) => array,
        Err(err) => {
            log::error!("Failed to allocate waveform array: {}", err);
            return std::ptr::null_mut();
        }
    };
    if let Err(err) = env.set_float_array_region(&array, 0, &points) {
        log::error!("Failed to fill waveform array: {}", err);
        return std::ptr::null_mut();
    }
    array.into_raw()
}

#[no_mangle]
pub extern "system" fn Java_com_audiowave_AudiowaveModule_nativeRelease(
    _env: JNIEnv,
    _class: JClass,
    player_id: jlong,
) -> jint {
    to_code(remove_session(player_id))
}
