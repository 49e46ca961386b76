//! FFmpeg hardware device contexts.
//!
//! Compiled only with the `hardware` feature. Provides device enumeration for
//! the capability probe, attaches a device context to a codec context before
//! the hardware-video adapter opens its decoder, and copies decoded surfaces
//! back to system memory.
//!
//! Availability depends on both the FFmpeg build and the host's GPU drivers.
//! Every helper degrades to software decoding rather than failing.

use ffmpeg_next::{codec::context::Context as CodecContext, frame::Video as VideoFrame};
use ffmpeg_sys_next::{
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AVBufferRef, AVCodec, AVCodecContext, AVCodecHWConfig,
    AVHWDeviceType,
};

use crate::engine::EngineChoice;
use crate::error::FramepackError;
use crate::ffmpeg::ensure_initialized;

/// Hardware device families FFmpeg can decode on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareDeviceType {
    /// NVIDIA CUDA.
    Cuda,
    /// Video Acceleration API (Linux).
    Vaapi,
    /// DirectX Video Acceleration 2 (Windows).
    Dxva2,
    /// Direct3D 11 Video Acceleration (Windows).
    D3d11va,
    /// Apple VideoToolbox.
    VideoToolbox,
    /// Intel Quick Sync Video.
    Qsv,
}

impl HardwareDeviceType {
    fn from_av(device_type: AVHWDeviceType) -> Option<Self> {
        match device_type {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HardwareDeviceType::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HardwareDeviceType::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2 => Some(HardwareDeviceType::Dxva2),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HardwareDeviceType::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => Some(HardwareDeviceType::VideoToolbox),
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HardwareDeviceType::Qsv),
            _ => None,
        }
    }
}

/// List the hardware device types compiled into the linked FFmpeg.
pub fn available_hardware_devices() -> Vec<HardwareDeviceType> {
    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }
        if let Some(device) = HardwareDeviceType::from_av(device_type) {
            devices.push(device);
        }
    }

    devices
}

/// Attach a hardware device context to `codec_context` if the codec
/// advertises one that can be created on this host.
///
/// `codec` is the decoder the context will be opened with. Returns `true`
/// when a device was attached; the caller opens the decoder either way.
pub(crate) fn attach_hardware_device(codec_context: &mut CodecContext, codec: *const AVCodec) -> bool {
    let Some(device_type) = preferred_device_for_codec(codec) else {
        return false;
    };
    let Some(mut device_context) = create_device(device_type) else {
        return false;
    };

    unsafe {
        let context_pointer = codec_context.as_mut_ptr() as *mut AVCodecContext;
        (*context_pointer).hw_device_ctx = ffmpeg_sys_next::av_buffer_ref(device_context);
        // The codec context holds its own reference now.
        ffmpeg_sys_next::av_buffer_unref(&mut device_context);
    }

    log::debug!("Attached hardware device {device_type:?}");
    true
}

/// Copy a hardware surface into a system-memory frame.
pub(crate) fn transfer_hardware_frame(
    hardware_frame: &VideoFrame,
    frame_number: u64,
) -> Result<VideoFrame, FramepackError> {
    let mut software_frame = VideoFrame::empty();

    let result = unsafe {
        ffmpeg_sys_next::av_hwframe_transfer_data(
            software_frame.as_mut_ptr(),
            hardware_frame.as_ptr(),
            0,
        )
    };

    if result < 0 {
        return Err(FramepackError::DecodeFailed {
            engine: EngineChoice::HardwareVideoDecoder,
            frame: frame_number,
            reason: format!("hardware frame transfer failed (result={result})"),
        });
    }

    unsafe {
        (*software_frame.as_mut_ptr()).pts = (*hardware_frame.as_ptr()).pts;
    }
    Ok(software_frame)
}

/// Whether a decoded frame lives on a hardware surface.
pub(crate) fn is_hardware_frame(frame: &VideoFrame) -> bool {
    unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() }
}

/// Whether the named decoder can run on a hardware device this host can
/// open right now.
pub fn hardware_decode_available(codec_name: &str) -> bool {
    if ensure_initialized().is_err() {
        return false;
    }
    ffmpeg_next::decoder::find_by_name(codec_name)
        .and_then(|codec| usable_device_for_codec(unsafe { codec.as_ptr() }))
        .is_some()
}

/// The device `codec` prefers, if a context for it can be created here.
/// The trial context is released before returning.
pub(crate) fn usable_device_for_codec(codec: *const AVCodec) -> Option<AVHWDeviceType> {
    let device_type = preferred_device_for_codec(codec)?;
    let mut device_context = create_device(device_type)?;
    unsafe { ffmpeg_sys_next::av_buffer_unref(&mut device_context) };
    Some(device_type)
}

/// Open a device context, or `None` when the driver or device is missing.
fn create_device(device_type: AVHWDeviceType) -> Option<*mut AVBufferRef> {
    let mut device_context: *mut AVBufferRef = std::ptr::null_mut();
    let result = unsafe {
        ffmpeg_sys_next::av_hwdevice_ctx_create(
            &mut device_context,
            device_type,
            std::ptr::null(),
            std::ptr::null_mut(),
            0,
        )
    };
    if result < 0 || device_context.is_null() {
        log::debug!("Hardware device {device_type:?} unavailable (result={result})");
        return None;
    }
    Some(device_context)
}

/// First device-context hardware config the codec advertises.
fn preferred_device_for_codec(codec_pointer: *const AVCodec) -> Option<AVHWDeviceType> {
    if codec_pointer.is_null() {
        return None;
    }

    let mut index: i32 = 0;
    loop {
        let config: *const AVCodecHWConfig =
            unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec_pointer, index) };
        if config.is_null() {
            return None;
        }

        let methods = unsafe { (*config).methods };
        let device_type = unsafe { (*config).device_type };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0
            && device_type != AVHWDeviceType::AV_HWDEVICE_TYPE_NONE
        {
            return Some(device_type);
        }

        index += 1;
    }
}
