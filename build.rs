// 构建脚本: 静态链接 FFmpeg 时补齐 Windows 系统库
fn main() {
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // libx264: 输出视频的 H.264 编码器
        println!("cargo:rustc-link-lib=dylib=libx264");

        // OLE 自动化和VFW (avformat 依赖)
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (avformat 网络协议)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
