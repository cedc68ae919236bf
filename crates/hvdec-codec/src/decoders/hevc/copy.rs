//! 拷贝路径: 零拷贝未建立时, 把图像逐平面拷贝/转换到单独分配的宿主缓冲区.

use hvdec_core::{HvError, HvResult};
use hvdec_scale::{PlaneInput, PlaneOutput, convert_plane};
use log::trace;

use super::format::resolve_format;
use super::negotiate::OutputNegotiator;
use crate::engine::DecodedPicture;
use crate::frame::VideoFrame;
use crate::host::{HostPipeline, MapFlags};

/// 图像各平面中的最大位深
pub fn max_bit_depth(picture: &dyn DecodedPicture) -> u32 {
    (0..picture.chroma().plane_count())
        .map(|plane| picture.bit_depth(plane))
        .max()
        .unwrap_or(0)
}

/// 拷贝一幅图像
///
/// 输出格式按最大位深选择, 各平面按自身位深转换到该格式的存储位深.
/// 选不出输出格式时返回 `Unsupported`.
pub fn copy_picture(
    picture: &dyn DecodedPicture,
    negotiator: &OutputNegotiator,
    host: &dyn HostPipeline,
    frame_number: u32,
) -> HvResult<VideoFrame> {
    let chroma = picture.chroma();
    let bits = max_bit_depth(picture);
    let format = resolve_format(chroma, bits).ok_or_else(|| {
        HvError::Unsupported(format!("不支持的输出格式: {chroma}, {bits} 位"))
    })?;

    let width = picture.width(0);
    let height = picture.height(0);
    let output = negotiator.image_available(format, width, height)?;
    let buffer = host.allocate_output_buffer(&output)?;

    let mut view = buffer.map(MapFlags::WRITE)?;
    let dst_bits = format.bits_per_component();
    let planes = chroma.plane_count();
    if view.n_planes() < planes {
        return Err(HvError::MapFailed(format!(
            "输出缓冲区只有 {} 个平面, 需要 {planes} 个",
            view.n_planes()
        )));
    }
    for plane in 0..planes {
        let (data, stride) = picture.plane(plane);
        let src = PlaneInput {
            data,
            stride,
            width: picture.width(plane),
            height: picture.height(plane),
            bit_depth: picture.bit_depth(plane),
        };
        let dst_stride = view.plane_stride(plane);
        let mut dst = PlaneOutput {
            data: view.plane_data_mut(plane),
            stride: dst_stride,
            bit_depth: dst_bits,
        };
        let conversion = convert_plane(&src, &mut dst)?;
        trace!("平面 {plane}: {conversion:?}");
    }
    view.unmap();

    Ok(VideoFrame {
        buffer,
        pixel_format: format,
        width: output.width,
        height: output.height,
        pts: picture.pts(),
        frame_number,
        frame_rate: output.frame_rate,
        zero_copy: false,
    })
}
